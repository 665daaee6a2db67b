//! File-upload client.
//!
//! Two forms post to the detection service:
//!
//! - the **archive** form sends a GeoTIFF as `file` and gets a zip of shapefiles back, which is
//!   downloaded through a transient object URL while the progress bar steps 0% → 50% → 100%;
//! - the **coordinate** form sends an image plus its four corner coordinates and gets JSON
//!   `{message, download_url}` back, rendered as text and a link.
//!
//! Planning and response interpretation are plain functions; [`Client`] wires them to an
//! [`HttpClient`] and an [`EffectSink`].

use crate::{Client, until_cancelled};
use crate::errors::{Error, Result};
use crate::http::{FormField, HttpClient, HttpRequest, HttpResponse, PendingResponse, RequestBody};
use crate::page::{Effect, EffectSink, Region};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use url::Url;

pub const NO_FILE_ALERT: &str = "Please select a file to upload.";
pub const COMPLETION_MESSAGE: &str = "Weed detection complete.";
pub const COMPLETION_LINK_TEXT: &str = "Download the shapefile ZIP";
pub const COORDINATE_LINK_TEXT: &str = "Download Shapefile ZIP";
pub const COORDINATE_FAILURE_MESSAGE: &str = "Upload failed.";

/// A file picked in a file input.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(name: &str, content_type: &str, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.to_string(),
            content_type: content_type.to_string(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, guessing its content type from the extension.
    pub async fn open(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = mime_guess::from_path(path).first_or_octet_stream().to_string();
        Ok(Self {
            name,
            content_type,
            bytes: Bytes::from(bytes),
        })
    }

    fn into_field(self, field: &str) -> FormField {
        FormField::File {
            name: field.to_string(),
            filename: self.name,
            content_type: self.content_type,
            bytes: self.bytes,
        }
    }
}

/// Inputs of the GeoTIFF form. Only the first selected file is sent.
#[derive(Debug, Clone, Default)]
pub struct ArchiveUploadForm {
    pub files: Vec<SelectedFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corners {
    pub top_left: String,
    pub top_right: String,
    pub bottom_right: String,
    pub bottom_left: String,
}

/// Inputs of the image-with-coordinates form.
#[derive(Debug, Clone, Default)]
pub struct CoordinateUploadForm {
    pub corners: Corners,
    pub images: Vec<SelectedFile>,
}

/// Body of a successful coordinate upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    pub message: String,
    pub download_url: String,
}

/// A request ready to send plus the effects to apply before sending it.
#[derive(Debug, Clone)]
pub struct UploadPlan {
    pub request: HttpRequest,
    pub effects: Vec<Effect>,
}

/// Plan the GeoTIFF upload, or reject it if no file is selected.
pub fn plan_archive_upload(form: ArchiveUploadForm, endpoint: &Url) -> Result<UploadPlan> {
    let file = form.files.into_iter().next().ok_or(Error::NoFileSelected)?;

    let request = HttpRequest::post(endpoint.clone(), RequestBody::Multipart(vec![file.into_field("file")]))
        .with_header("Accept", "application/json");

    Ok(UploadPlan {
        request,
        effects: vec![Effect::ShowProgress, Effect::SetProgress(0), Effect::Clear(Region::Message)],
    })
}

/// Effects for the head of a GeoTIFF upload response.
///
/// Progress is an approximation: 50% once an OK head arrives, before the archive body is read.
pub fn archive_head_effects(response: &PendingResponse, filename: &str) -> Result<Vec<Effect>> {
    if !response.is_success() {
        return Err(Error::HttpStatus {
            status: response.status,
            status_text: response.status_text.clone(),
        });
    }

    if let Some(disposition) = response.header("content-disposition") {
        tracing::debug!(content_disposition = %disposition, saved_as = %filename, "Archive incoming");
    }

    Ok(vec![Effect::SetProgress(50)])
}

/// Effects once the archive body has been read: download it, then report completion at 100%.
pub fn archive_body_effects(body: Bytes, filename: &str) -> Vec<Effect> {
    vec![
        Effect::Download {
            filename: filename.to_string(),
            body,
        },
        Effect::SetProgress(100),
        Effect::AppendParagraph {
            region: Region::Message,
            text: COMPLETION_MESSAGE.to_string(),
        },
        Effect::AppendLink {
            region: Region::Message,
            text: COMPLETION_LINK_TEXT.to_string(),
            href: filename.to_string(),
        },
    ]
}

/// Effects rendering a failed GeoTIFF upload into the message region.
pub fn archive_failure_effects(err: &Error) -> Vec<Effect> {
    let text = match err {
        Error::NoFileSelected => return vec![Effect::Alert(NO_FILE_ALERT.to_string())],
        Error::HttpStatus { status_text, .. } => format!("Error uploading file: {status_text}"),
        other => format!("Error: {}", other.user_message()),
    };
    vec![
        Effect::Clear(Region::Message),
        Effect::AppendParagraph {
            region: Region::Message,
            text,
        },
    ]
}

/// Plan the coordinate upload, or reject it if no image is selected.
pub fn plan_coordinate_upload(form: CoordinateUploadForm, endpoint: &Url) -> Result<UploadPlan> {
    let image = form.images.into_iter().next().ok_or(Error::NoFileSelected)?;
    let Corners {
        top_left,
        top_right,
        bottom_right,
        bottom_left,
    } = form.corners;

    let text = |name: &str, value: String| FormField::Text {
        name: name.to_string(),
        value,
    };
    let fields = vec![
        text("top_left", top_left),
        text("top_right", top_right),
        text("bottom_right", bottom_right),
        text("bottom_left", bottom_left),
        image.into_field("image"),
    ];

    Ok(UploadPlan {
        request: HttpRequest::post(endpoint.clone(), RequestBody::Multipart(fields)),
        effects: Vec::new(),
    })
}

/// Parse a coordinate upload response into its receipt and the effects rendering it.
pub fn coordinate_response_effects(response: HttpResponse) -> Result<(UploadReceipt, Vec<Effect>)> {
    if !response.is_success() {
        return Err(Error::HttpStatus {
            status: response.status,
            status_text: response.status_text,
        });
    }

    let receipt: UploadReceipt = response.json()?;
    let effects = vec![
        Effect::Clear(Region::Result),
        Effect::AppendParagraph {
            region: Region::Result,
            text: receipt.message.clone(),
        },
        Effect::AppendLink {
            region: Region::Result,
            text: COORDINATE_LINK_TEXT.to_string(),
            href: receipt.download_url.clone(),
        },
    ];
    Ok((receipt, effects))
}

/// Effects rendering a failed coordinate upload into the result region.
pub fn coordinate_failure_effects(err: &Error) -> Vec<Effect> {
    let text = match err {
        Error::NoFileSelected => return vec![Effect::Alert(NO_FILE_ALERT.to_string())],
        Error::HttpStatus { .. } => COORDINATE_FAILURE_MESSAGE.to_string(),
        other => format!("Error: {}", other.user_message()),
    };
    vec![
        Effect::Clear(Region::Result),
        Effect::AppendParagraph {
            region: Region::Result,
            text,
        },
    ]
}

/// How a finished upload ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Archive handed to the page as a download
    Downloaded { filename: String, size: usize },
    /// Server prepared the archive and returned a link to it
    Linked(UploadReceipt),
}

impl<H: HttpClient> Client<H> {
    /// Submit the GeoTIFF form.
    ///
    /// Every failure is rendered to `sink` before being returned, except cancellation and a
    /// concurrent submission, which leave the page untouched.
    #[tracing::instrument(skip_all, fields(endpoint = %self.endpoints.archive_upload))]
    pub async fn upload_archive(
        &self,
        form: ArchiveUploadForm,
        sink: &dyn EffectSink,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome> {
        let _guard = self.uploads.try_begin()?;

        let result = async {
            let plan = plan_archive_upload(form, &self.endpoints.archive_upload)?;
            sink.apply_all(plan.effects);

            let response = self.send(&plan.request, cancel, "upload").await?;
            sink.apply_all(archive_head_effects(&response, &self.download_filename)?);

            let body = until_cancelled(response.read_body(), cancel, "upload").await?;
            let size = body.len();
            sink.apply_all(archive_body_effects(body, &self.download_filename));

            Ok::<_, Error>(UploadOutcome::Downloaded {
                filename: self.download_filename.clone(),
                size,
            })
        }
        .await;

        if let Err(err) = &result {
            err.log();
            if !matches!(err, Error::Cancelled { .. }) {
                sink.apply_all(archive_failure_effects(err));
            }
        }
        result
    }

    /// Submit the image-with-coordinates form.
    #[tracing::instrument(skip_all, fields(endpoint = %self.endpoints.image_upload))]
    pub async fn upload_with_coordinates(
        &self,
        form: CoordinateUploadForm,
        sink: &dyn EffectSink,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome> {
        let _guard = self.uploads.try_begin()?;

        let result = async {
            let plan = plan_coordinate_upload(form, &self.endpoints.image_upload)?;
            sink.apply_all(plan.effects);

            let response = self.execute(&plan.request, cancel, "upload").await?;
            let (receipt, effects) = coordinate_response_effects(response)?;
            sink.apply_all(effects);

            Ok::<_, Error>(UploadOutcome::Linked(receipt))
        }
        .await;

        if let Err(err) = &result {
            err.log();
            if !matches!(err, Error::Cancelled { .. }) {
                sink.apply_all(coordinate_failure_effects(err));
            }
        }
        result
    }
}
