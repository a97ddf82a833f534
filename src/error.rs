//! 파이프라인 에러 정의
//!
//! 프론트엔드에서 i18n 처리를 위해 각 에러는 문자열 코드(`code()`)를 함께 제공합니다.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 감시 대상 또는 대상 경로 없음
pub const ERR_NOT_FOUND: &str = "ERR_NOT_FOUND";

/// 접근 권한 없음
pub const ERR_PERMISSION_DENIED: &str = "ERR_PERMISSION_DENIED";

/// 복사 중 읽기/쓰기 실패
pub const ERR_IO: &str = "ERR_IO";

/// 계획 이후 원본 파일이 사라지거나 변경됨
pub const ERR_SOURCE_VANISHED: &str = "ERR_SOURCE_VANISHED";

/// 사용자 취소
pub const ERR_CANCELLED: &str = "ERR_CANCELLED";

/// 복사 후 무결성 검사 실패
pub const ERR_VERIFICATION_FAILED: &str = "ERR_VERIFICATION_FAILED";

/// 잘못된 설정
pub const ERR_INVALID_CONFIG: &str = "ERR_INVALID_CONFIG";

/// Watch 시작 실패
pub const ERR_WATCH_START_FAILED: &str = "ERR_WATCH_START_FAILED";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("path not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied: {}", .path.display())]
    PermissionDenied { path: PathBuf },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("source entry vanished during transfer: {}", .path.display())]
    SourceVanished { path: PathBuf },

    #[error("source entry changed during transfer: {} (planned {planned} bytes, read {actual})", .path.display())]
    SourceChanged {
        path: PathBuf,
        planned: u64,
        actual: u64,
    },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("verification failed for {failed} of {total} files")]
    VerificationFailed { failed: u32, total: u32 },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl PipelineError {
    /// Classifies an I/O error raised while touching `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => ERR_NOT_FOUND,
            Self::PermissionDenied { .. } => ERR_PERMISSION_DENIED,
            Self::Io { .. } => ERR_IO,
            Self::SourceVanished { .. } | Self::SourceChanged { .. } => ERR_SOURCE_VANISHED,
            Self::Cancelled => ERR_CANCELLED,
            Self::VerificationFailed { .. } => ERR_VERIFICATION_FAILED,
            Self::InvalidConfig { .. } => ERR_INVALID_CONFIG,
            Self::Watch(_) => ERR_WATCH_START_FAILED,
        }
    }

    /// Path the failure is attached to, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound { path }
            | Self::PermissionDenied { path }
            | Self::Io { path, .. }
            | Self::SourceVanished { path }
            | Self::SourceChanged { path, .. } => Some(path),
            _ => None,
        }
    }
}
