mod share_service;

pub use share_service::{
    DownloadedFile, ShareError, ShareResult, ShareService, SweepReport, UploadRequest,
};
