pub mod file_handler;

pub use file_handler::{
    delete_file, download_file, download_file_by_query, get_file_info, list_files, upload_file,
};
