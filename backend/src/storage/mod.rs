pub mod files;
pub mod retention;

pub use files::{
    FileStore, IMAGE_EXTENSIONS, StorageError, is_image_filename, patient_file_token, secure_filename,
};
pub use retention::RetentionPolicy;
