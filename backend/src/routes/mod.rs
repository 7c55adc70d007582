pub mod chatbot;
pub mod error;
pub mod predict;
pub mod report;

use actix_files::Files;
use actix_web::http::header;
use actix_web::middleware::DefaultHeaders;
use actix_web::web;
use std::path::PathBuf;

pub use error::ApiError;

use crate::storage::is_image_filename;

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: PathBuf, upload_dir: PathBuf) {
    cfg.service(
        web::resource("/")
            .route(web::get().to(predict::index_page))
            .route(web::post().to(predict::handle_upload)),
    )
    .service(
        web::resource("/report/{patient_name}/{age}/{gender}/{filename}/{result}/{confidence}")
            .route(web::get().to(report::download_report)),
    )
    .service(web::resource("/chatbot").route(web::post().to(chatbot::chatbot_reply)))
    .service(Files::new("/static", static_dir))
    .service(
        web::scope("/uploads")
            .wrap(DefaultHeaders::new().add((header::X_CONTENT_TYPE_OPTIONS, "nosniff")))
            .service(Files::new("", upload_dir).path_filter(|path, _| is_image_filename(path))),
    );
}
