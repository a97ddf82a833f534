pub mod engine;
pub mod enumerate;
pub mod types;
pub mod verify;

pub use engine::TransferEngine;
pub use enumerate::PathEnumerator;
pub use types::{
    FileEntry, HiddenEntryPolicy, TransferPlan, TransferProgress, TransferSummary, VerificationFailure,
    VerificationReport, VerificationResult, COPY_CHUNK_SIZE, HASH_CHUNK_SIZE,
};
pub use verify::IntegrityVerifier;
