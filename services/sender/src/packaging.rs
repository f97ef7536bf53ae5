//! Packaging & ingest handoff. Runs off the serializer
//! thread through a bounded pool so a slow tar/move never blocks the
//! `RequestMonitor`.

use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::Semaphore;
use tracing::error;

#[derive(Debug, Clone)]
pub struct PackagingJob {
    /// `<prefix>_<timetag>_<host>`, matching the staging directory name the
    /// Worker produced (`services/worker/src/copydriver.rs`); reused here
    /// as the ingest basename so the two ends agree without extra state.
    pub basename: String,
    /// The delivered directory the Worker's copy agent wrote to, read here
    /// after the fact — never mutated by the Sender.
    pub source_dir: PathBuf,
    pub spade_dir: PathBuf,
    pub write_meta_xml: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("failed to build tar archive: {0}")]
    Tar(String),
    #[error("failed to write semaphore file: {0}")]
    Semaphore(String),
    #[error("failed to move staged files into SPADE directory: {0}")]
    Move(String),
}

/// A bounded pool of packaging workers. `submit` never blocks the caller
/// past acquiring a permit; the packaging itself runs on a blocking thread
/// since tar/move are synchronous filesystem operations.
#[derive(Clone)]
pub struct PackagingPool {
    semaphore: std::sync::Arc<Semaphore>,
}

impl PackagingPool {
    pub fn new(max_concurrent: usize) -> Self {
        PackagingPool {
            semaphore: std::sync::Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub fn submit(&self, job: PackagingJob) {
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            if let Err(e) = tokio::task::spawn_blocking(move || package_blocking(&job))
                .await
                .expect("packaging task panicked")
            {
                error!(error = %e, "packaging failed, put the data manually in the SPADE directory");
            }
        });
    }
}

fn package_blocking(job: &PackagingJob) -> Result<(), PackagingError> {
    let tar_name = format!("HS_{}.tar", job.basename);
    let sem_name = if job.write_meta_xml {
        format!("HS_{}.meta.xml", job.basename)
    } else {
        format!("HS_{}.sem", job.basename)
    };

    let tar_tmp = job.spade_dir.join(format!(".{tar_name}.tmp"));
    let sem_tmp = job.spade_dir.join(format!(".{sem_name}.tmp"));

    build_tar(&job.source_dir, &tar_tmp).map_err(|e| PackagingError::Tar(e.to_string()))?;

    std::fs::rename(&tar_tmp, job.spade_dir.join(&tar_name))
        .map_err(|e| PackagingError::Move(e.to_string()))?;

    write_semaphore(&sem_tmp, job.write_meta_xml, &job.basename)
        .map_err(|e| PackagingError::Semaphore(e.to_string()))?;

    // The semaphore must become visible strictly after the tar — it is renamed into place only once the tar rename
    // above has already succeeded.
    std::fs::rename(&sem_tmp, job.spade_dir.join(&sem_name))
        .map_err(|e| PackagingError::Move(e.to_string()))?;

    Ok(())
}

fn build_tar(source_dir: &Path, tar_tmp: &Path) -> io::Result<()> {
    let file = std::fs::File::create(tar_tmp)?;
    let mut builder = tar::Builder::new(file);
    let dir_name = source_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| source_dir.as_os_str().to_os_string());
    builder.append_dir_all(&dir_name, source_dir)?;
    builder.finish()
}

fn write_semaphore(sem_tmp: &Path, write_meta_xml: bool, basename: &str) -> io::Result<()> {
    if write_meta_xml {
        let xml = format!(
            "<?xml version=\"1.0\"?>\n<DIF_Plus><Notification><Source>HSiface</Source><File>{basename}</File></Notification></DIF_Plus>\n"
        );
        std::fs::write(sem_tmp, xml)
    } else {
        std::fs::write(sem_tmp, b"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn packages_tar_then_semaphore_in_that_order() {
        let source = TempDir::new().unwrap();
        std::fs::write(source.path().join("HitSpool-0.dat"), b"payload").unwrap();
        let spade = TempDir::new().unwrap();

        let job = PackagingJob {
            basename: "SNALERT_100_ichub01".into(),
            source_dir: source.path().to_path_buf(),
            spade_dir: spade.path().to_path_buf(),
            write_meta_xml: false,
        };
        package_blocking(&job).unwrap();

        assert!(spade.path().join("HS_SNALERT_100_ichub01.tar").exists());
        assert!(spade.path().join("HS_SNALERT_100_ichub01.sem").exists());
    }

    #[test]
    fn meta_xml_flavor_writes_xml_semaphore() {
        let source = TempDir::new().unwrap();
        std::fs::write(source.path().join("HitSpool-0.dat"), b"payload").unwrap();
        let spade = TempDir::new().unwrap();

        let job = PackagingJob {
            basename: "ANON_5_ichub66".into(),
            source_dir: source.path().to_path_buf(),
            spade_dir: spade.path().to_path_buf(),
            write_meta_xml: true,
        };
        package_blocking(&job).unwrap();

        let sem = std::fs::read_to_string(spade.path().join("HS_ANON_5_ichub66.meta.xml")).unwrap();
        assert!(sem.contains("DIF_Plus"));
    }

    #[test]
    fn missing_source_dir_leaves_nothing_in_spade() {
        let spade = TempDir::new().unwrap();
        let job = PackagingJob {
            basename: "SNALERT_1_ichub01".into(),
            source_dir: PathBuf::from("/does/not/exist"),
            spade_dir: spade.path().to_path_buf(),
            write_meta_xml: false,
        };
        assert!(package_blocking(&job).is_err());
        assert!(!spade.path().join("HS_SNALERT_1_ichub01.tar").exists());
    }
}
