mod file_dto;

pub use file_dto::{
    content_disposition, is_mime_type_allowed, normalize_mime_type, sanitize_filename,
    DeleteFileResponseDto, DownloadQuery, FileInfoDto, UploadFileDto,
    UploadResponseDto, ALLOWED_MIME_TYPES,
};
