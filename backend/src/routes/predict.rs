use actix_multipart::Multipart;
use actix_web::http::header::ContentType;
use actix_web::{HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use shared::{LatestPrediction, PatientRecord};

use super::error::ApiError;
use crate::inference::{Predictor, decode_image};
use crate::session::{PredictionStore, SessionId};
use crate::storage::FileStore;
use crate::views::IndexPage;

struct UploadForm {
    patient: PatientRecord,
    file: Option<(String, Vec<u8>)>,
}

pub(super) fn html_page(session: &SessionId, body: String) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    builder.content_type(ContentType::html());
    if session.is_fresh() {
        builder.cookie(session.cookie());
    }
    builder.body(body)
}

pub async fn index_page(session: SessionId) -> HttpResponse {
    html_page(&session, IndexPage::empty().render())
}

async fn read_form(mut payload: Multipart, store: &FileStore) -> Result<UploadForm, ApiError> {
    let mut patient_name = None;
    let mut age = None;
    let mut gender = None;
    let mut file = None;

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        let upload_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            store.validate_size(data.len() + chunk.len())?;
            data.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "file" => {
                // Browsers send an empty part when no file was chosen.
                if let Some(upload_name) = upload_name.filter(|n| !n.is_empty()) {
                    if !data.is_empty() {
                        file = Some((upload_name, data));
                    }
                }
            }
            "patient_name" => patient_name = Some(String::from_utf8_lossy(&data).into_owned()),
            "age" => age = Some(String::from_utf8_lossy(&data).into_owned()),
            "gender" => gender = Some(String::from_utf8_lossy(&data).into_owned()),
            other => log::debug!("Ignoring form field {:?}", other),
        }
    }

    Ok(UploadForm {
        patient: PatientRecord {
            name: patient_name.unwrap_or_else(|| "Unknown".to_string()),
            age: age.unwrap_or_default(),
            gender: gender.unwrap_or_default(),
        },
        file,
    })
}

pub async fn handle_upload(
    payload: Multipart,
    session: SessionId,
    predictor: web::Data<Predictor>,
    store: web::Data<FileStore>,
    predictions: web::Data<PredictionStore>,
) -> Result<HttpResponse, ApiError> {
    let form = read_form(payload, &store).await?;

    let Some((upload_name, data)) = form.file else {
        log::info!("Upload form submitted without a file");
        let page = IndexPage {
            patient: Some(form.patient),
            ..IndexPage::empty()
        };
        return Ok(html_page(&session, page.render()));
    };

    let worker_store = store.clone();
    let worker_predictor = predictor.clone();
    let (filename, result) = web::block(move || -> Result<_, ApiError> {
        // Nothing reaches the upload directory unless it decodes as an image.
        let image = decode_image(&data)?;
        let (filename, _) = worker_store.save_upload(&upload_name, &data)?;
        let result = worker_predictor.predict_image(&image, &filename)?;
        worker_store.sweep();
        Ok((filename, result))
    })
    .await??;

    log::info!(
        "Predicted {} ({}%) for {}",
        result.label,
        result.confidence,
        filename
    );

    let latest = LatestPrediction {
        patient: form.patient,
        filename,
        result,
    };
    predictions.record(&session, latest.clone());

    Ok(html_page(&session, IndexPage::with_prediction(&latest).render()))
}
