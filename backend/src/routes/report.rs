use actix_files::NamedFile;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpRequest, HttpResponse, web};
use shared::PatientRecord;

use super::error::ApiError;
use crate::report::{ReportGenerator, ReportRequest};

/// `(patient_name, age, gender, filename, result, confidence)`
type ReportPath = (String, String, String, String, String, String);

pub async fn download_report(
    req: HttpRequest,
    path: web::Path<ReportPath>,
    generator: web::Data<ReportGenerator>,
) -> Result<HttpResponse, ApiError> {
    let (name, age, gender, filename, result, confidence) = path.into_inner();
    let request = ReportRequest {
        patient: PatientRecord { name, age, gender },
        filename,
        result,
        confidence,
    };

    let generator = generator.clone();
    let report_path = web::block(move || generator.generate(&request)).await??;

    let download_name = report_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report.pdf".to_string());

    let file = NamedFile::open_async(&report_path)
        .await?
        .use_etag(false)
        .use_last_modified(false)
        .set_content_disposition(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(download_name)],
        });
    Ok(file.into_response(&req))
}
