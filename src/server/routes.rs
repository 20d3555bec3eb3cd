use super::protocol::{AskForm, AskRequest};
use super::{ServerState, WebError};
use crate::decoder;
use crate::error::Error;
use crate::fetch;
use crate::vqa::Answer;
use actix_multipart::form::MultipartForm;
use actix_web::http::header::ContentType;
use actix_web::{get, post, web, HttpResponse};
use base64::{engine::general_purpose, Engine as _};
use tracing::info;

type Result<T> = std::result::Result<T, WebError>;

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(body)
}

/// Decode `bytes` and answer `question` on the blocking thread pool, bounded
/// by the configured timeout
async fn answer_in_background<B>(
    state: &ServerState,
    question: String,
    bytes: B,
) -> std::result::Result<Answer, Error>
where
    B: AsRef<[u8]> + Send + 'static,
{
    let pipeline = state.pipeline.clone();
    let job = web::block(move || {
        let image = decoder::decode_image(bytes.as_ref())?;
        pipeline.answer(&question, &image)
    });

    let outcome = match state.inference_timeout {
        Some(limit) => tokio::time::timeout(limit, job)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => job.await,
    };

    outcome.map_err(|e| Error::Inference(format!("inference task failed: {e}")))?
}

/// Landing page
#[get("/")]
pub async fn index(state: web::Data<ServerState>) -> Result<HttpResponse> {
    Ok(html(state.pages.index()?))
}

/// The question/upload form
#[get("/upload")]
pub async fn upload(state: web::Data<ServerState>) -> Result<HttpResponse> {
    Ok(html(state.pages.upload(&state.demo.question)?))
}

/// Answer a question about an uploaded image
#[post("/ask")]
pub async fn ask(
    MultipartForm(form): MultipartForm<AskForm>,
    state: web::Data<ServerState>,
) -> Result<HttpResponse> {
    let AskRequest { question, image } = AskRequest::try_from(form)?;
    info!(
        "question about uploaded image {:?} ({} bytes)",
        image.file_name,
        image.data.len()
    );

    let data = image.data;
    let answer = answer_in_background(&state, question.clone(), data.clone()).await?;

    let preview = format!(
        "data:{};base64,{}",
        decoder::image_mime_type(&data),
        general_purpose::STANDARD.encode(&data)
    );
    Ok(html(state.pages.answer(&question, answer.as_str(), &preview)?))
}

/// Answer the fixed demo question about the fixed demo image
#[get("/demo")]
pub async fn demo(state: web::Data<ServerState>) -> Result<HttpResponse> {
    let demo = &state.demo;
    let bytes =
        fetch::fetch_image_bytes(&state.http, &demo.image_url, state.max_fetch_bytes).await?;
    let answer = answer_in_background(&state, demo.question.clone(), bytes).await?;
    Ok(html(state.pages.demo(&demo.question, &demo.image_url, answer.as_str())?))
}
