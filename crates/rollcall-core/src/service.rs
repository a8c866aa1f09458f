//! Enrollment, recognition and bulk training over injected backends.

use crate::encoder::{self, EncoderError, FaceEncoder};
use crate::ledger::{AttendanceEntry, AttendanceLedger, LedgerError, MarkOutcome};
use crate::matcher::MatchConfig;
use crate::store::{EncodingStore, StoreError};
use crate::types::{BoundingBox, Embedding, FaceLabel, FaceRecord, UNKNOWN_LABEL};
use chrono::{NaiveDate, NaiveDateTime};
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no face detected in image")]
    NoFaceDetected,
    #[error("encoding store: {0}")]
    Store(#[from] StoreError),
    #[error("attendance ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("face encoder: {0}")]
    Encoder(#[from] EncoderError),
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One detected face in a probe image.
#[derive(Debug, Clone, Serialize)]
pub struct RecognizedFace {
    pub label: FaceLabel,
    /// Distance to the accepted record, or to the closest one when unknown.
    pub distance: Option<f32>,
    /// Ledger outcome; `None` for unknown faces.
    pub attendance: Option<MarkOutcome>,
    pub bbox: BoundingBox,
}

/// Result of recognizing a probe image.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Recognition {
    NoFaces,
    Faces {
        /// In detection order.
        faces: Vec<RecognizedFace>,
        /// No enrolled records existed, so every face is unknown.
        known_set_empty: bool,
    },
}

impl Recognition {
    /// One label per detected face; empty for [`Recognition::NoFaces`].
    pub fn labels(&self) -> Vec<FaceLabel> {
        match self {
            Recognition::NoFaces => Vec::new(),
            Recognition::Faces { faces, .. } => faces.iter().map(|f| f.label.clone()).collect(),
        }
    }
}

/// Summary of a bulk training run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainReport {
    pub records: usize,
    pub people: usize,
    /// Images that failed to decode or held no face.
    pub skipped: Vec<PathBuf>,
}

/// Enrollment, recognition and attendance over injected backends.
pub struct AttendanceService<E, S, L> {
    encoder: E,
    store: S,
    ledger: L,
    config: MatchConfig,
}

impl<E, S, L> AttendanceService<E, S, L>
where
    E: FaceEncoder,
    S: EncodingStore,
    L: AttendanceLedger,
{
    pub fn new(encoder: E, store: S, ledger: L, config: MatchConfig) -> Self {
        Self { encoder, store, ledger, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Enroll one reference face for `name`.
    ///
    /// Nothing is written unless a face is found and encoded.
    pub fn enroll(
        &mut self,
        name: &str,
        image: &RgbImage,
    ) -> Result<FaceRecord, AttendanceError> {
        let name = validate_name(name)?;
        let faces = self.encoder.detect(image)?;
        let Some(idx) = self.config.selector.select(&faces) else {
            tracing::info!(name, "enroll: no face detected, store unchanged");
            return Err(AttendanceError::NoFaceDetected);
        };

        let embedding = self.encoder.encode(image, &faces[idx])?;
        let record = FaceRecord::new(name, embedding);
        self.store.append(record.clone())?;

        tracing::info!(
            name,
            faces = faces.len(),
            selected = idx,
            dims = record.embedding.len(),
            "enroll: face stored"
        );
        Ok(record)
    }

    pub fn enroll_bytes(
        &mut self,
        name: &str,
        bytes: &[u8],
    ) -> Result<FaceRecord, AttendanceError> {
        validate_name(name)?;
        let image = encoder::decode_image(bytes)?;
        self.enroll(name, &image)
    }

    /// Label every face in `image` and mark attendance for recognized ones
    /// on `now`'s date.
    pub fn recognize(
        &mut self,
        image: &RgbImage,
        now: NaiveDateTime,
    ) -> Result<Recognition, AttendanceError> {
        let faces = self.encoder.detect(image)?;
        if faces.is_empty() {
            tracing::info!("recognize: no faces detected");
            return Ok(Recognition::NoFaces);
        }

        let gallery = self.store.load()?;
        let known_set_empty = gallery.is_empty();
        if known_set_empty {
            tracing::warn!("recognize: no enrolled faces, every face will be {UNKNOWN_LABEL}");
        }

        let matcher = self.config.policy.matcher();
        let mut results = Vec::with_capacity(faces.len());
        for (i, face) in faces.into_iter().enumerate() {
            let probe = self.encoder.encode(image, &face)?;
            let result = matcher.compare(&probe, &gallery, self.config.tolerance);
            tracing::debug!(
                face = i,
                matched = ?result.name,
                distance = ?result.distance,
                "recognize: face compared"
            );

            let label = match result.name {
                Some(name) => FaceLabel::Known(name),
                None => FaceLabel::Unknown,
            };
            results.push(RecognizedFace {
                label,
                distance: result.distance,
                attendance: None,
                bbox: face,
            });
        }

        let (date, time) = (now.date(), now.time());
        for face in &mut results {
            if let FaceLabel::Known(name) = &face.label {
                face.attendance = Some(self.ledger.mark(name, date, time)?);
            }
        }

        tracing::info!(
            faces = results.len(),
            known = results.iter().filter(|f| f.attendance.is_some()).count(),
            "recognize: complete"
        );
        Ok(Recognition::Faces { faces: results, known_set_empty })
    }

    pub fn recognize_bytes(
        &mut self,
        bytes: &[u8],
        now: NaiveDateTime,
    ) -> Result<Recognition, AttendanceError> {
        let image = encoder::decode_image(bytes)?;
        self.recognize(&image, now)
    }

    pub fn view(&self, date: NaiveDate) -> Result<Vec<AttendanceEntry>, AttendanceError> {
        Ok(self.ledger.view(date)?)
    }

    /// Rebuild the store from `dir/<person>/<image>` files.
    ///
    /// Unreadable, undecodable or faceless images are skipped; the store is
    /// only replaced once every image has been processed.
    pub fn train(&mut self, dir: &Path) -> Result<TrainReport, AttendanceError> {
        let mut report = TrainReport::default();
        let mut records = Vec::new();

        for person_dir in sorted_entries(dir)?.into_iter().filter(|p| p.is_dir()) {
            let person = person_dir.file_name().and_then(|n| n.to_str()).map(str::to_owned);
            let Some(person) = person else {
                tracing::warn!(path = %person_dir.display(), "train: skipping non-UTF-8 name");
                continue;
            };
            if validate_name(&person).is_err() {
                tracing::warn!(path = %person_dir.display(), "train: skipping reserved name");
                continue;
            }

            let before = records.len();
            for path in sorted_entries(&person_dir)?.into_iter().filter(|p| !p.is_dir()) {
                match self.encode_training_image(&path)? {
                    Some(embedding) => records.push(FaceRecord::new(person.clone(), embedding)),
                    None => report.skipped.push(path),
                }
            }
            if records.len() > before {
                report.people += 1;
            }
        }

        report.records = records.len();
        self.store.replace_all(records)?;

        tracing::info!(
            dir = %dir.display(),
            records = report.records,
            people = report.people,
            skipped = report.skipped.len(),
            "train: encoding store rebuilt"
        );
        Ok(report)
    }

    /// `Ok(None)` for images to skip.
    fn encode_training_image(
        &mut self,
        path: &Path,
    ) -> Result<Option<Embedding>, AttendanceError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "train: skipping unreadable file"
                );
                return Ok(None);
            }
        };
        let image = match encoder::decode_image(&bytes) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "train: skipping undecodable file"
                );
                return Ok(None);
            }
        };

        let faces = self.encoder.detect(&image)?;
        let Some(idx) = self.config.selector.select(&faces) else {
            tracing::warn!(path = %path.display(), "train: no face detected, skipping");
            return Ok(None);
        };
        Ok(Some(self.encoder.encode(&image, &faces[idx])?))
    }
}

fn validate_name(name: &str) -> Result<&str, AttendanceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AttendanceError::InvalidInput("name must not be empty".into()));
    }
    if name.eq_ignore_ascii_case(UNKNOWN_LABEL) {
        return Err(AttendanceError::InvalidInput(format!(
            "{UNKNOWN_LABEL:?} is reserved for unrecognized faces"
        )));
    }
    Ok(name)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, AttendanceError> {
    let io_err = |source| AttendanceError::Io { path: dir.to_path_buf(), source };
    let mut paths = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}
