//! Expansion of the resolution × format matrix into work items.

use std::collections::HashSet;

use rf_core::{OutputFormat, Resolution, WorkItem};

/// Build the work items for one job.
///
/// Items are ordered by resolution, then by format, exactly as configured;
/// that order is the order artifacts are reported in. Repeated labels or
/// formats keep their first occurrence only.
pub fn expand(resolutions: &[Resolution], formats: &[OutputFormat]) -> Vec<WorkItem> {
    let mut seen_labels = HashSet::new();
    let resolutions: Vec<&Resolution> = resolutions
        .iter()
        .filter(|r| seen_labels.insert(r.label()))
        .collect();

    let mut seen_formats = HashSet::new();
    let formats: Vec<&OutputFormat> = formats
        .iter()
        .filter(|f| seen_formats.insert(f.as_str()))
        .collect();

    let mut items = Vec::with_capacity(resolutions.len() * formats.len());
    for resolution in &resolutions {
        for format in &formats {
            items.push(WorkItem::new((*resolution).clone(), (*format).clone()));
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_core::Geometry;

    fn res(label: &str, w: u32, h: u32) -> Resolution {
        Resolution::new(label, Geometry::new(w, h)).unwrap()
    }

    fn fmt(s: &str) -> OutputFormat {
        OutputFormat::new(s).unwrap()
    }

    fn names(items: &[WorkItem]) -> Vec<String> {
        items.iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn canonical_order() {
        let items = expand(
            &[res("720p", 1280, 720), res("360p", 640, 360)],
            &[fmt("mp4"), fmt("webm")],
        );
        assert_eq!(
            names(&items),
            ["720p/mp4", "720p/webm", "360p/mp4", "360p/webm"]
        );
        assert_eq!(items[0].geometry(), Geometry::new(1280, 720));
    }

    #[test]
    fn size_is_product() {
        let resolutions = [
            res("1080p", 1920, 1080),
            res("720p", 1280, 720),
            res("480p", 854, 480),
        ];
        let formats = [fmt("mp4"), fmt("avi"), fmt("mkv"), fmt("webm")];
        let items = expand(&resolutions, &formats);
        assert_eq!(items.len(), 12);

        let unique: HashSet<String> = names(&items).into_iter().collect();
        assert_eq!(unique.len(), 12);
    }

    #[test]
    fn empty_inputs_yield_no_items() {
        assert!(expand(&[], &[fmt("mp4")]).is_empty());
        assert!(expand(&[res("720p", 1280, 720)], &[]).is_empty());
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let items = expand(
            &[res("720p", 1280, 720), res("720p", 1, 1), res("360p", 640, 360)],
            &[fmt("mp4"), fmt("MP4")],
        );
        assert_eq!(names(&items), ["720p/mp4", "360p/mp4"]);
        assert_eq!(items[0].geometry(), Geometry::new(1280, 720));
    }

    #[test]
    fn deterministic() {
        let r = [res("720p", 1280, 720), res("360p", 640, 360)];
        let f = [fmt("webm"), fmt("mp4")];
        assert_eq!(expand(&r, &f), expand(&r, &f));
    }
}
