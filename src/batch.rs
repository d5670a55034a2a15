//! Runs one detector over a file or a directory of images.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{info, warn};
use parking_lot::Mutex;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::{
    detection::{Detector, Verdict},
    error::{Result, StegoError},
    normalize::has_extension,
};

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<Verdict>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    stego: usize,
    total: usize,
}

#[derive(Debug)]
pub struct BatchSummary {
    /// Sorted by path.
    pub outcomes: Vec<FileOutcome>,
    /// Successfully analysed files flagged as stego.
    pub stego_count: usize,
    /// Successfully analysed files.
    pub total: usize,
}

impl BatchSummary {
    pub fn detection_percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.stego_count as f64 / self.total as f64 * 100.0
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &StegoError)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Err(e) => Some((o.path.as_path(), e)),
            Ok(_) => None,
        })
    }

    pub fn suspected(&self) -> impl Iterator<Item = &Path> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Ok(v) if v.is_stego => Some(o.path.as_path()),
            _ => None,
        })
    }
}

/// Files to analyse under `path`: the file itself, or the matching entries of
/// a directory (non-recursive, sorted).
pub fn collect_images(path: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        return Err(StegoError::InvalidParameter(format!(
            "Invalid path: {}",
            path.display()
        )));
    }

    let mut files = fs::read_dir(path)?
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {e}", path.display());
                None
            }
        })
        .filter(|p| p.is_file() && has_extension(p, extensions))
        .collect::<Vec<_>>();
    files.sort();

    Ok(files)
}

pub struct BatchDriver<'a> {
    detector: &'a dyn Detector,
    parallel: bool,
}

impl<'a> BatchDriver<'a> {
    pub fn new(detector: &'a dyn Detector) -> Self {
        Self {
            detector,
            parallel: true,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn process_path(&self, path: &Path) -> Result<BatchSummary> {
        let extensions = self.detector.extensions();
        let files = collect_images(path, &extensions)?;

        if path.is_dir() {
            let unsupported = self
                .detector
                .method()
                .supported_extensions()
                .iter()
                .copied()
                .filter(|ext| !extensions.contains(ext))
                .collect::<Vec<_>>();
            if !unsupported.is_empty() {
                let ignored = collect_images(path, &unsupported)?.len();
                if ignored > 0 {
                    warn!(
                        "Ignoring {ignored} {} file(s) in {}: no decoder configured",
                        unsupported.join("/"),
                        path.display()
                    );
                }
            }
        }

        Ok(self.run(&files))
    }

    pub fn run(&self, files: &[PathBuf]) -> BatchSummary {
        info!(
            "Running {} over {} file(s)",
            self.detector.name(),
            files.len()
        );

        let tally = Mutex::new(Tally::default());
        let outcomes = Mutex::new(Vec::with_capacity(files.len()));

        let process = |path: &PathBuf| {
            let result = self.detector.detect(path);

            match &result {
                Ok(verdict) => {
                    let mut t = tally.lock();
                    t.total += 1;
                    if verdict.is_stego {
                        t.stego += 1;
                    }
                }
                Err(e) => warn!("Skipping {}: {e}", path.display()),
            }

            outcomes.lock().push(FileOutcome {
                path: path.clone(),
                result,
            });
        };

        if self.parallel {
            files.par_iter().for_each(process);
        } else {
            files.iter().for_each(process);
        }

        let mut outcomes = outcomes.into_inner();
        outcomes.sort_by(|a, b| a.path.cmp(&b.path));
        let tally = tally.into_inner();

        info!("{} of {} analysed file(s) flagged", tally.stego, tally.total);

        BatchSummary {
            outcomes,
            stego_count: tally.stego,
            total: tally.total,
        }
    }
}
