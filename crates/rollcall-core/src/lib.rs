//! rollcall-core: face enrollment, recognition and daily attendance.
//!
//! Faces are found with SCRFD and encoded with ArcFace via ONNX Runtime,
//! matched against a CSV-backed encoding store, and recognized people are
//! logged once per day to `Attendance_<DD-MM-YYYY>.csv` ledgers.

mod alignment;
mod csvfile;
pub mod detector;
pub mod encoder;
pub mod ledger;
pub mod matcher;
pub mod recognizer;
pub mod service;
pub mod store;
pub mod types;

pub use csvfile::StorageError;
pub use encoder::{decode_image, EncoderError, FaceEncoder, OnnxFaceEncoder};
pub use ledger::{AttendanceEntry, AttendanceLedger, CsvLedger, LedgerError, MarkOutcome};
pub use matcher::{FirstMatch, MatchConfig, MatchPolicy, MatchResult, Matcher, NearestNeighbor};
pub use service::{AttendanceError, AttendanceService, Recognition, RecognizedFace, TrainReport};
pub use store::{CsvEncodingStore, EncodingStore, MemoryEncodingStore, StoreError};
pub use types::{BoundingBox, Embedding, FaceLabel, FaceRecord, FaceSelector, UNKNOWN_LABEL};
