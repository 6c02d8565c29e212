//! The asset registry: curation, promotion and per-project bookkeeping.
//!
//! A completed job's manifest is a pool of candidate diagrams. The
//! registry lets a user stage a selection, promote the job into a durable
//! project, and afterwards add or remove individual assets. Project state
//! lives in three places:
//!
//! * the job record (carries the project back-reference),
//! * the project document record under `{root}/documents/`, and
//! * the disk mirror `registry.json` inside the project folder.
//!
//! The document record is authoritative; the mirror exists so a crash
//! between writes is recoverable. Every mutation writes the document
//! first, then the mirror, and reads rebuild a missing document from the
//! mirror transparently. Within a batch, a missing file on disk skips that
//! one asset with a warning — partial success beats an aborted batch,
//! because the user can always re-run the curation step.

use crate::error::PlanliftError;
use crate::job::{JobStatus, JobStore};
use crate::manifest::{
    DiagramAsset, Manifest, SavedAsset, SelectedImage, SelectionRecord,
};
use crate::store::{ProjectDocument, ProjectStore};
use crate::storage::Storage;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A manifest or pool entry paired with its serving URL.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestImage {
    #[serde(flatten)]
    pub asset: DiagramAsset,
    pub url: String,
}

/// Curation and promotion over completed jobs and their projects.
pub struct RegistryService {
    storage: Storage,
    jobs: Arc<JobStore>,
    projects: ProjectStore,
}

impl RegistryService {
    pub fn new(storage: Storage, jobs: Arc<JobStore>) -> Self {
        let projects = ProjectStore::new(storage.clone());
        RegistryService {
            storage,
            jobs,
            projects,
        }
    }

    /// The job's manifest with serving URLs attached.
    ///
    /// URLs are job-scoped before promotion and project-scoped after, so a
    /// client can keep using this call across the promotion boundary.
    pub fn list_manifest(&self, job_id: &str) -> Result<Vec<ManifestImage>, PlanliftError> {
        let job = self.completed_job(job_id)?;
        let manifest = self.read_manifest(job_id, &job.job_dir)?;

        let images = manifest
            .images
            .into_iter()
            .map(|asset| {
                let url = match &job.project_id {
                    Some(pid) => Storage::project_file_url(pid, &asset.path),
                    None => Storage::job_file_url(job_id, &asset.path),
                };
                ManifestImage { asset, url }
            })
            .collect();
        Ok(images)
    }

    /// Stage a subset of the manifest into `{job_dir}/staged/` and persist
    /// the selection record.
    ///
    /// A requested filename that is not in the manifest, or whose crop is
    /// missing on disk, is skipped; the batch continues.
    pub fn select(
        &self,
        job_id: &str,
        filenames: &[String],
    ) -> Result<SelectionRecord, PlanliftError> {
        let job = self.completed_job(job_id)?;
        let manifest = self.read_manifest(job_id, &job.job_dir)?;
        let staged_dir = Storage::staged_dir(&job.job_dir);
        std::fs::create_dir_all(&staged_dir).map_err(|e| PlanliftError::io(&staged_dir, e))?;

        let mut images = Vec::new();
        for filename in filenames {
            let Some(asset) = manifest.images.iter().find(|a| &a.filename == filename) else {
                warn!("Job {}: '{}' not in manifest, skipping", job_id, filename);
                continue;
            };
            let source = job.job_dir.join(&asset.path);
            if !source.exists() {
                warn!("Job {}: crop '{}' missing on disk, skipping", job_id, filename);
                continue;
            }
            let dest = staged_dir.join(filename);
            std::fs::copy(&source, &dest).map_err(|e| PlanliftError::io(&dest, e))?;

            let saved_path = format!("staged/{filename}");
            images.push(SelectedImage {
                filename: filename.clone(),
                page_number: asset.page_num,
                label: asset.label.clone(),
                diagram_seq: asset.diagram_seq.clone(),
                sub_index: asset.sub_index,
                original_path: asset.path.clone(),
                url: Storage::job_file_url(job_id, &saved_path),
                saved_path,
            });
        }

        let record = SelectionRecord {
            total_selected: images.len(),
            timestamp: Utc::now(),
            dpi: manifest.dpi,
            images,
        };
        record.write(&job.job_dir)?;
        info!(
            "Job {}: staged {} of {} requested assets",
            job_id,
            record.total_selected,
            filenames.len()
        );
        Ok(record)
    }

    /// Promote a completed, selected job into a project. Idempotent: a
    /// repeat call with the same pairing returns the existing document.
    ///
    /// The job directory is relocated to `{root}/projects/{project_id}`
    /// and every staged asset is renamed to its canonical
    /// `{project_id}_{page}_{seq}.png` under `assets/`.
    pub fn promote(
        &self,
        project_id: &str,
        job_id: &str,
    ) -> Result<ProjectDocument, PlanliftError> {
        let job = self.completed_job(job_id)?;
        let project_dir = self.storage.project_dir(project_id);

        // A job belongs to at most one project: its directory has already
        // been relocated there, so promoting it elsewhere would rename that
        // project's folder away.
        if let Some(owner) = job.project_id.as_deref() {
            if owner != project_id {
                return Err(PlanliftError::JobAlreadyPromoted {
                    id: job_id.to_string(),
                    project_id: owner.to_string(),
                });
            }
        }

        if job.project_id.as_deref() == Some(project_id) && project_dir.exists() {
            debug!("Job {} already promoted to '{}'", job_id, project_id);
            if let Some(doc) = self.projects.get(project_id)? {
                return Ok(doc);
            }
            // Document lost between promote and now: fall through and
            // rebuild from what's on disk.
        }

        // Relocate the job dir. A missing source with an existing target
        // means a previous attempt got this far; carry on from there.
        if job.job_dir != project_dir && job.job_dir.exists() {
            if project_dir.exists() {
                return Err(PlanliftError::Internal(format!(
                    "project directory '{}' already exists",
                    project_dir.display()
                )));
            }
            std::fs::rename(&job.job_dir, &project_dir)
                .map_err(|e| PlanliftError::io(&project_dir, e))?;
            info!("Job {} relocated to project '{}'", job_id, project_id);
        } else if !project_dir.exists() {
            return Err(PlanliftError::ManifestMissing {
                id: job_id.to_string(),
                path: Storage::manifest_path(&job.job_dir),
            });
        }

        let selection = SelectionRecord::read(&project_dir)?;
        let assets_dir = self.storage.assets_dir(project_id);
        std::fs::create_dir_all(&assets_dir).map_err(|e| PlanliftError::io(&assets_dir, e))?;

        let mut doc = match self.projects.get(project_id)? {
            Some(doc) => doc,
            None => ProjectDocument::new(project_id, selection.dpi),
        };
        doc.job_id = Some(job_id.to_string());
        doc.source = Some(job.source.clone());

        for image in &selection.images {
            let canonical =
                SavedAsset::canonical_filename(project_id, image.page_number, &image.diagram_seq);
            if doc.find_asset(&canonical).is_some() {
                continue;
            }
            let staged = project_dir.join(&image.saved_path);
            if !staged.exists() {
                warn!(
                    "Project '{}': staged '{}' missing, skipping",
                    project_id, image.filename
                );
                continue;
            }
            let dest = assets_dir.join(&canonical);
            std::fs::rename(&staged, &dest).map_err(|e| PlanliftError::io(&dest, e))?;

            doc.saved.push(SavedAsset {
                url: Storage::project_file_url(project_id, &format!("assets/{canonical}")),
                filename: canonical,
                page_number: image.page_number,
                label: image.label.clone(),
                diagram_seq: image.diagram_seq.clone(),
                sub_index: image.sub_index,
                source_filename: Some(image.filename.clone()),
                rooms: Vec::new(),
            });
        }

        // Document record first, mirror second, job link last. Any prefix
        // of these surviving a crash is recoverable at read time.
        self.projects.upsert(&mut doc)?;
        self.write_mirror(&doc)?;
        self.jobs.relocate(job_id, &project_dir)?;
        self.jobs.link_project(job_id, project_id)?;

        info!(
            "Project '{}': promoted {} assets from job {}",
            project_id,
            doc.saved.len(),
            job_id
        );
        Ok(doc)
    }

    /// The project's current registry, rebuilding the document from the
    /// disk mirror when the record is missing.
    pub fn saved(&self, project_id: &str) -> Result<ProjectDocument, PlanliftError> {
        if let Some(doc) = self.projects.get(project_id)? {
            return Ok(doc);
        }
        let mirror = self.storage.registry_mirror_path(project_id);
        if mirror.exists() {
            warn!(
                "Project '{}': document record missing, rebuilding from mirror",
                project_id
            );
            let mut doc: ProjectDocument = Storage::read_json(&mirror)?;
            self.projects.upsert(&mut doc)?;
            return Ok(doc);
        }
        Err(PlanliftError::ProjectNotFound {
            id: project_id.to_string(),
        })
    }

    /// Candidate-pool entries (sectioned crops) not currently promoted.
    pub fn available(&self, project_id: &str) -> Result<Vec<ManifestImage>, PlanliftError> {
        let doc = self.saved(project_id)?;
        let project_dir = self.storage.project_dir(project_id);
        let manifest = Manifest::read(&project_dir)?;

        let images = manifest
            .images
            .into_iter()
            .filter(|a| {
                !doc.saved
                    .iter()
                    .any(|s| s.source_filename.as_deref() == Some(a.filename.as_str()))
            })
            .map(|asset| ManifestImage {
                url: Storage::project_file_url(project_id, &asset.path),
                asset,
            })
            .collect();
        Ok(images)
    }

    /// Add candidates to and/or evict assets from a promoted project.
    ///
    /// Removals delete the canonical crop file; the entry's source crop (if
    /// still in `sectioned/`) reappears in [`RegistryService::available`].
    /// Additions copy from the candidate pool under canonical naming and
    /// are idempotent per source crop.
    pub fn update_saved(
        &self,
        project_id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<ProjectDocument, PlanliftError> {
        let mut doc = self.saved(project_id)?;
        let project_dir = self.storage.project_dir(project_id);
        let assets_dir = self.storage.assets_dir(project_id);

        for filename in remove {
            let before = doc.saved.len();
            doc.saved.retain(|a| &a.filename != filename);
            if doc.saved.len() == before {
                warn!(
                    "Project '{}': remove of unknown asset '{}' ignored",
                    project_id, filename
                );
                continue;
            }
            let path = assets_dir.join(filename);
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Project '{}': removed '{}'", project_id, filename),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(PlanliftError::io(&path, e)),
            }
        }

        if !add.is_empty() {
            let manifest = Manifest::read(&project_dir)?;
            std::fs::create_dir_all(&assets_dir)
                .map_err(|e| PlanliftError::io(&assets_dir, e))?;
            for filename in add {
                if doc
                    .saved
                    .iter()
                    .any(|s| s.source_filename.as_deref() == Some(filename.as_str()))
                {
                    debug!(
                        "Project '{}': '{}' already promoted, skipping",
                        project_id, filename
                    );
                    continue;
                }
                let Some(asset) = manifest.images.iter().find(|a| &a.filename == filename)
                else {
                    warn!(
                        "Project '{}': '{}' not in candidate pool, skipping",
                        project_id, filename
                    );
                    continue;
                };
                let source = project_dir.join(&asset.path);
                if !source.exists() {
                    warn!(
                        "Project '{}': crop '{}' missing on disk, skipping",
                        project_id, filename
                    );
                    continue;
                }
                let canonical = SavedAsset::canonical_filename(
                    project_id,
                    asset.page_num,
                    &asset.diagram_seq,
                );
                let dest = assets_dir.join(&canonical);
                std::fs::copy(&source, &dest).map_err(|e| PlanliftError::io(&dest, e))?;

                doc.saved.push(SavedAsset {
                    url: Storage::project_file_url(project_id, &format!("assets/{canonical}")),
                    filename: canonical,
                    page_number: asset.page_num,
                    label: asset.label.clone(),
                    diagram_seq: asset.diagram_seq.clone(),
                    sub_index: asset.sub_index,
                    source_filename: Some(filename.clone()),
                    rooms: Vec::new(),
                });
            }
        }

        self.persist(&mut doc)?;

        // Third write: keep the staged-pool record in step with the
        // registry, so both agree on what is promoted after a crash.
        let images: Vec<SelectedImage> = doc
            .saved
            .iter()
            .filter_map(|a| {
                a.source_filename.as_ref().map(|source| SelectedImage {
                    filename: source.clone(),
                    page_number: a.page_number,
                    label: a.label.clone(),
                    diagram_seq: a.diagram_seq.clone(),
                    sub_index: a.sub_index,
                    original_path: format!("sectioned/{source}"),
                    saved_path: format!("assets/{}", a.filename),
                    url: a.url.clone(),
                })
            })
            .collect();
        let selection = SelectionRecord {
            total_selected: images.len(),
            timestamp: Utc::now(),
            dpi: doc.dpi,
            images,
        };
        selection.write(&project_dir)?;

        Ok(doc)
    }

    /// Register an externally supplied image (one that never went through
    /// the pipeline) as a project asset.
    pub fn register_uploaded(
        &self,
        project_id: &str,
        image_path: &Path,
        page_number: usize,
        label: &str,
    ) -> Result<ProjectDocument, PlanliftError> {
        let mut doc = self.saved(project_id)?;
        if !image_path.exists() {
            return Err(PlanliftError::FileNotFound {
                path: image_path.to_path_buf(),
            });
        }

        // First sequence letter not yet used on this page.
        let seq = (b'a'..=b'z')
            .map(|c| (c as char).to_string())
            .find(|s| {
                let candidate = SavedAsset::canonical_filename(project_id, page_number, s);
                doc.find_asset(&candidate).is_none()
            })
            .ok_or_else(|| {
                PlanliftError::Internal(format!(
                    "page {page_number} has no free sequence letters"
                ))
            })?;

        let canonical = SavedAsset::canonical_filename(project_id, page_number, &seq);
        let assets_dir = self.storage.assets_dir(project_id);
        std::fs::create_dir_all(&assets_dir).map_err(|e| PlanliftError::io(&assets_dir, e))?;
        let dest = assets_dir.join(&canonical);
        std::fs::copy(image_path, &dest).map_err(|e| PlanliftError::io(&dest, e))?;

        let sub_index = doc
            .saved
            .iter()
            .filter(|a| a.page_number == page_number)
            .count()
            + 1;
        doc.saved.push(SavedAsset {
            url: Storage::project_file_url(project_id, &format!("assets/{canonical}")),
            filename: canonical,
            page_number,
            label: label.to_string(),
            diagram_seq: seq,
            sub_index,
            source_filename: None,
            rooms: Vec::new(),
        });

        self.persist(&mut doc)?;
        Ok(doc)
    }

    /// Remove a project entirely: document record, mirror and folder.
    pub fn delete_project(&self, project_id: &str) -> Result<(), PlanliftError> {
        self.projects.delete(project_id)?;
        let dir = self.storage.project_dir(project_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => info!("Project '{}' deleted", project_id),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PlanliftError::io(&dir, e)),
        }
        Ok(())
    }

    /// Write the document record, then the mirror.
    pub(crate) fn persist(&self, doc: &mut ProjectDocument) -> Result<(), PlanliftError> {
        self.projects.upsert(doc)?;
        self.write_mirror(doc)
    }

    fn write_mirror(&self, doc: &ProjectDocument) -> Result<(), PlanliftError> {
        Storage::write_json(&self.storage.registry_mirror_path(&doc.project_id), doc)
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    fn completed_job(&self, job_id: &str) -> Result<crate::job::ProcessingJob, PlanliftError> {
        let job = self.jobs.get(job_id).ok_or_else(|| PlanliftError::JobNotFound {
            id: job_id.to_string(),
        })?;
        if job.status != JobStatus::Done {
            return Err(PlanliftError::JobNotComplete {
                id: job_id.to_string(),
                status: job.status.as_str().to_string(),
            });
        }
        Ok(job)
    }

    fn read_manifest(&self, job_id: &str, job_dir: &Path) -> Result<Manifest, PlanliftError> {
        let path = Storage::manifest_path(job_dir);
        if !path.exists() {
            return Err(PlanliftError::ManifestMissing {
                id: job_id.to_string(),
                path,
            });
        }
        Manifest::read(job_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobParams, ProcessingJob};
    use crate::manifest::Provenance;

    /// A completed job with a manifest of synthetic crops on disk.
    struct Fixture {
        _dir: tempfile::TempDir,
        storage: Storage,
        jobs: Arc<JobStore>,
        registry: RegistryService,
        job_id: String,
    }

    fn entry(page: usize, seq: &str, label: &str, sub_index: usize) -> DiagramAsset {
        let filename = if label == "full" {
            format!("crop{page}.png")
        } else {
            format!("crop{page}.{seq}.png")
        };
        DiagramAsset {
            path: format!("sectioned/{filename}"),
            filename,
            page_num: page,
            label: label.to_string(),
            diagram_seq: seq.to_string(),
            sub_index,
            source: Provenance::FullPage,
        }
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        storage.ensure_layout().unwrap();
        let jobs = Arc::new(JobStore::open(storage.jobs_dir()).unwrap());

        let params = JobParams {
            dpi: 300,
            min_area_pct: 5.0,
        };
        let mut job = ProcessingJob::new("plan.pdf", params, "");
        job.job_dir = storage.job_dir(&job.id);
        let job = jobs.insert(job).unwrap();

        let entries = vec![
            entry(1, "a", "full", 1),
            entry(2, "a", "top-left", 1),
            entry(2, "b", "bottom-right", 2),
        ];
        let sectioned = Storage::sectioned_dir(&job.job_dir);
        std::fs::create_dir_all(&sectioned).unwrap();
        for e in &entries {
            let img = image::DynamicImage::new_rgb8(50, 40);
            img.save(sectioned.join(&e.filename)).unwrap();
        }
        Manifest::new(entries, 300).write(&job.job_dir).unwrap();
        jobs.complete(&job.id).unwrap();

        let registry = RegistryService::new(storage.clone(), Arc::clone(&jobs));
        Fixture {
            _dir: dir,
            storage,
            jobs,
            registry,
            job_id: job.id,
        }
    }

    fn promote(f: &Fixture, project_id: &str, filenames: &[&str]) -> ProjectDocument {
        let names: Vec<String> = filenames.iter().map(|s| s.to_string()).collect();
        f.registry.select(&f.job_id, &names).unwrap();
        f.registry.promote(project_id, &f.job_id).unwrap()
    }

    #[test]
    fn manifest_urls_are_job_scoped_before_promotion() {
        let f = fixture();
        let images = f.registry.list_manifest(&f.job_id).unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(
            images[0].url,
            format!("/files/jobs/{}/sectioned/crop1.png", f.job_id)
        );
    }

    #[test]
    fn manifest_requires_completed_job() {
        let f = fixture();
        let params = JobParams {
            dpi: 300,
            min_area_pct: 5.0,
        };
        let pending = f
            .jobs
            .insert(ProcessingJob::new("x.pdf", params, "/tmp/x"))
            .unwrap();
        let err = f.registry.list_manifest(&pending.id).unwrap_err();
        assert!(matches!(err, PlanliftError::JobNotComplete { .. }));
    }

    #[test]
    fn select_skips_unknown_and_missing_sources() {
        let f = fixture();
        let job = f.jobs.get(&f.job_id).unwrap();
        // Delete one crop from disk so its selection must be skipped.
        std::fs::remove_file(Storage::sectioned_dir(&job.job_dir).join("crop2.b.png")).unwrap();

        let record = f
            .registry
            .select(
                &f.job_id,
                &[
                    "crop1.png".to_string(),
                    "crop2.b.png".to_string(),
                    "nope.png".to_string(),
                ],
            )
            .unwrap();
        assert_eq!(record.total_selected, 1);
        assert_eq!(record.images[0].filename, "crop1.png");
        assert_eq!(record.images[0].saved_path, "staged/crop1.png");
        assert!(Storage::staged_dir(&job.job_dir).join("crop1.png").exists());
    }

    #[test]
    fn promote_moves_dir_and_renames_canonically() {
        let f = fixture();
        let old_dir = f.jobs.get(&f.job_id).unwrap().job_dir;
        let doc = promote(&f, "p1", &["crop1.png", "crop2.a.png"]);

        assert_eq!(doc.saved.len(), 2);
        let names: Vec<&str> = doc.saved.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["p1_1_a.png", "p1_2_a.png"]);
        assert_eq!(doc.saved[0].source_filename.as_deref(), Some("crop1.png"));
        assert_eq!(doc.saved[0].url, "/files/p1/assets/p1_1_a.png");

        assert!(!old_dir.exists(), "job dir must be relocated");
        assert!(f.storage.assets_dir("p1").join("p1_1_a.png").exists());
        assert!(f.storage.registry_mirror_path("p1").exists());

        let job = f.jobs.get(&f.job_id).unwrap();
        assert_eq!(job.project_id.as_deref(), Some("p1"));
        assert_eq!(job.job_dir, f.storage.project_dir("p1"));
    }

    #[test]
    fn promote_is_idempotent() {
        let f = fixture();
        let first = promote(&f, "p1", &["crop1.png"]);
        let second = f.registry.promote("p1", &f.job_id).unwrap();
        assert_eq!(first.saved.len(), second.saved.len());
        assert_eq!(second.saved[0].filename, "p1_1_a.png");
    }

    #[test]
    fn promote_to_second_project_is_rejected() {
        let f = fixture();
        promote(&f, "p1", &["crop1.png"]);

        let err = f.registry.promote("p2", &f.job_id).unwrap_err();
        assert!(matches!(err, PlanliftError::JobAlreadyPromoted { .. }));

        // The first project must be untouched.
        assert!(f.storage.project_dir("p1").exists());
        assert!(!f.storage.project_dir("p2").exists());
        assert_eq!(f.registry.saved("p1").unwrap().saved.len(), 1);
    }

    #[test]
    fn manifest_urls_switch_after_promotion() {
        let f = fixture();
        promote(&f, "p1", &["crop1.png"]);
        let images = f.registry.list_manifest(&f.job_id).unwrap();
        assert_eq!(images[0].url, "/files/p1/sectioned/crop1.png");
    }

    #[test]
    fn available_excludes_promoted_sources() {
        let f = fixture();
        promote(&f, "p1", &["crop1.png"]);

        let pool = f.registry.available("p1").unwrap();
        let names: Vec<&str> = pool.iter().map(|i| i.asset.filename.as_str()).collect();
        assert_eq!(names, vec!["crop2.a.png", "crop2.b.png"]);
    }

    #[test]
    fn update_saved_add_is_idempotent_per_source() {
        let f = fixture();
        promote(&f, "p1", &["crop1.png"]);

        let doc = f
            .registry
            .update_saved("p1", &["crop2.a.png".to_string()], &[])
            .unwrap();
        assert_eq!(doc.saved.len(), 2);

        // Adding the same source again changes nothing.
        let doc = f
            .registry
            .update_saved("p1", &["crop2.a.png".to_string()], &[])
            .unwrap();
        assert_eq!(doc.saved.len(), 2);
    }

    #[test]
    fn update_saved_remove_returns_source_to_pool() {
        let f = fixture();
        promote(&f, "p1", &["crop1.png", "crop2.a.png"]);

        let doc = f
            .registry
            .update_saved("p1", &[], &["p1_2_a.png".to_string()])
            .unwrap();
        assert_eq!(doc.saved.len(), 1);
        assert!(!f.storage.assets_dir("p1").join("p1_2_a.png").exists());

        let pool = f.registry.available("p1").unwrap();
        assert!(pool.iter().any(|i| i.asset.filename == "crop2.a.png"));
    }

    #[test]
    fn update_saved_rewrites_selection_record() {
        let f = fixture();
        promote(&f, "p1", &["crop1.png", "crop2.a.png"]);

        f.registry
            .update_saved(
                "p1",
                &["crop2.b.png".to_string()],
                &["p1_1_a.png".to_string()],
            )
            .unwrap();

        let record = SelectionRecord::read(&f.storage.project_dir("p1")).unwrap();
        assert_eq!(record.total_selected, 2);
        let names: Vec<&str> = record.images.iter().map(|i| i.filename.as_str()).collect();
        assert!(names.contains(&"crop2.a.png"));
        assert!(names.contains(&"crop2.b.png"));
        assert!(!names.contains(&"crop1.png"), "evicted source must drop out");
    }

    #[test]
    fn update_saved_remove_missing_file_is_not_an_error() {
        let f = fixture();
        promote(&f, "p1", &["crop1.png"]);
        std::fs::remove_file(f.storage.assets_dir("p1").join("p1_1_a.png")).unwrap();

        let doc = f
            .registry
            .update_saved("p1", &[], &["p1_1_a.png".to_string()])
            .unwrap();
        assert!(doc.saved.is_empty());
    }

    #[test]
    fn saved_rebuilds_document_from_mirror() {
        let f = fixture();
        promote(&f, "p1", &["crop1.png"]);

        // Simulate a crash that lost the document record.
        std::fs::remove_file(f.storage.document_path("p1")).unwrap();

        let doc = f.registry.saved("p1").unwrap();
        assert_eq!(doc.saved.len(), 1);
        assert!(
            f.storage.document_path("p1").exists(),
            "recovery must re-persist the document record"
        );
    }

    #[test]
    fn saved_unknown_project_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.registry.saved("ghost").unwrap_err(),
            PlanliftError::ProjectNotFound { .. }
        ));
    }

    #[test]
    fn register_uploaded_assigns_free_sequence() {
        let f = fixture();
        promote(&f, "p1", &["crop1.png"]);

        let upload = f.storage.root().join("external.png");
        image::DynamicImage::new_rgb8(30, 30).save(&upload).unwrap();

        let doc = f
            .registry
            .register_uploaded("p1", &upload, 1, "site-plan")
            .unwrap();
        assert_eq!(doc.saved.len(), 2);
        let added = doc.find_asset("p1_1_b.png").unwrap();
        assert_eq!(added.label, "site-plan");
        assert!(added.source_filename.is_none());
        assert!(f.storage.assets_dir("p1").join("p1_1_b.png").exists());
    }

    #[test]
    fn delete_project_removes_everything() {
        let f = fixture();
        promote(&f, "p1", &["crop1.png"]);

        f.registry.delete_project("p1").unwrap();
        assert!(!f.storage.project_dir("p1").exists());
        assert!(matches!(
            f.registry.saved("p1").unwrap_err(),
            PlanliftError::ProjectNotFound { .. }
        ));
        // A second delete is a no-op.
        f.registry.delete_project("p1").unwrap();
    }
}
