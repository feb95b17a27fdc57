//! Shared test harness for integration tests.
//!
//! Provides [`TestEnv`], a temp directory holding a fake `ffmpeg` shell
//! script, an output directory, a staging directory and a file-backed job
//! database, plus a [`Config`] pointing at all of them.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use rf_core::config::{Config, MatrixConfig};
use rf_core::{Geometry, OutputFormat, Resolution};
use rf_pipeline::TranscodeService;
use tempfile::TempDir;

/// Fake encoder. Answers `-version`, checks the staged input exists, logs
/// its arguments, then copies the input to the last argument. Outputs
/// matching `FAIL_GLOB` fail with an ffmpeg-like message instead.
const FAKE_FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
    echo "ffmpeg version 6.1-fake"
    exit 0
fi
for out; do :; done
echo "$*" >> "$(dirname "$0")/args.log"
if [ ! -f "$4" ]; then
    echo "$4: No such file or directory" >&2
    exit 1
fi
case "$out" in
    FAIL_GLOB)
        echo "Unknown encoder 'libvpx-vp9'" >&2
        exit 1
        ;;
esac
cat "$4" > "$out"
"#;

/// Fake encoder that starts writing its output and then hangs.
pub const HANGING_FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
    echo "ffmpeg version 6.1-fake"
    exit 0
fi
for out; do :; done
printf 'partial' > "$out"
exec sleep 5
"#;

pub struct TestEnv {
    pub dir: TempDir,
    pub config: Config,
}

impl TestEnv {
    /// Every variant succeeds.
    pub fn new() -> Self {
        Self::failing("__never__")
    }

    /// Variants whose output path matches the shell glob `fail_glob` fail.
    pub fn failing(fail_glob: &str) -> Self {
        Self::with_script(&FAKE_FFMPEG.replace("FAIL_GLOB", fail_glob))
    }

    /// Use `body` as the `ffmpeg` script.
    pub fn with_script(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let script = write_script(dir.path(), body);

        let mut config = Config::default();
        config.tools.ffmpeg_path = Some(script);
        config.tools.timeout_secs = 30;
        config.storage.output_dir = dir.path().join("out");
        config.storage.staging_dir = dir.path().join("staging");
        config.storage.db_path = dir.path().join("db").join("videos.db");
        config.storage.public_base_url = "http://localhost:8080/videos".into();
        config.matrix = small_matrix();
        config.concurrency.workers_per_job = Some(2);
        config.concurrency.global_limit = Some(2);

        Self { dir, config }
    }

    /// Point the encoder at a file that exists but cannot be executed.
    pub fn without_encoder() -> Self {
        let env = Self::new();
        let bogus = env.dir.path().join("not-ffmpeg");
        std::fs::write(&bogus, b"plain text").expect("failed to write bogus encoder");
        let mut config = env.config.clone();
        config.tools.ffmpeg_path = Some(bogus);
        Self { config, ..env }
    }

    pub fn service(&self) -> TranscodeService {
        TranscodeService::from_config(&self.config).expect("failed to build service")
    }

    /// Write an input file the caller "uploads".
    pub fn upload(&self, name: &str) -> PathBuf {
        self.upload_bytes(name, b"not really a movie")
    }

    pub fn upload_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("failed to write upload");
        path
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.storage.output_dir
    }

    pub fn staging_is_empty(&self) -> bool {
        std::fs::read_dir(&self.config.storage.staging_dir)
            .map(|mut d| d.next().is_none())
            .unwrap_or(true)
    }

    /// Arguments of every encoder invocation, one line each.
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("args.log"))
            .map(|s| s.lines().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Write the config as JSON for CLI tests and return its path.
    pub fn write_config(&self) -> PathBuf {
        let path = self.dir.path().join("reelforge.json");
        let json = serde_json::to_string_pretty(&self.config).expect("failed to serialize config");
        std::fs::write(&path, json).expect("failed to write config");
        path
    }
}

/// {720p, 360p} x {mp4, webm}
pub fn small_matrix() -> MatrixConfig {
    MatrixConfig {
        resolutions: vec![
            Resolution::new("720p", Geometry::new(1280, 720)).unwrap(),
            Resolution::new("360p", Geometry::new(640, 360)).unwrap(),
        ],
        formats: vec![
            OutputFormat::new("mp4").unwrap(),
            OutputFormat::new("webm").unwrap(),
        ],
    }
}

#[cfg(unix)]
fn write_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ffmpeg");
    {
        // Closed before exec to avoid ETXTBSY.
        let mut file = std::fs::File::create(&path).expect("failed to create script");
        file.write_all(body.as_bytes()).expect("failed to write script");
        file.sync_all().expect("failed to sync script");
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("failed to chmod script");
    path
}

#[cfg(not(unix))]
fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("ffmpeg");
    let mut file = std::fs::File::create(&path).expect("failed to create script");
    file.write_all(body.as_bytes()).expect("failed to write script");
    path
}
