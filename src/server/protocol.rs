use crate::error::{Error, Result};
use actix_multipart::form::{bytes::Bytes, text::Text, MultipartForm};

/// The `multipart/form-data` body posted by the upload page.
///
/// Both fields are optional at the parsing level so that an absent field
/// becomes `Error::MissingField` instead of a generic multipart error.
#[derive(MultipartForm)]
pub struct AskForm {
    pub text: Option<Text<String>>,
    pub image: Option<Bytes>,
}

/// A validated question/image pair
pub struct AskRequest {
    pub question: String,
    pub image: Bytes,
}

impl TryFrom<AskForm> for AskRequest {
    type Error = Error;

    /// The question may be empty. An image part with no bytes is what browsers
    /// send when no file was chosen, so it counts as missing.
    fn try_from(form: AskForm) -> Result<Self> {
        let question = form.text.ok_or(Error::MissingField("text"))?.into_inner();
        let image = form
            .image
            .filter(|image| !image.data.is_empty())
            .ok_or(Error::MissingField("image"))?;
        Ok(AskRequest { question, image })
    }
}
