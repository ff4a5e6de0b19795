//! Serialized subject processing.
//!
//! Subjects go to the generation service one at a time, in submission order;
//! the assumed service rate limit rules out concurrent calls. Each job's
//! status transitions are reported as they happen, not at batch end. A
//! submission cannot be cancelled once begun; discarding results for
//! subjects that were removed mid-flight is the state owner's job.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use image::ImageFormat;
use tokio::select;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::events::{ProcessSubject, SubjectUpdate};
use crate::service::GenerateService;

pub async fn run<S>(
    service: Arc<S>,
    mut jobs_rx: Receiver<ProcessSubject>,
    updates_tx: Sender<SubjectUpdate>,
    cancel: CancellationToken,
) -> Result<()>
where
    S: GenerateService + Send + Sync + 'static,
{
    loop {
        select! {
            _ = cancel.cancelled() => break,

            maybe_job = jobs_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let ProcessSubject { id, source, options } = job;
                info!(%id, path = %source.display(), "processing subject");
                let _ = updates_tx.send(SubjectUpdate::Begun { id }).await;

                let prepared = spawn_blocking({
                    let source = source.clone();
                    move || prepare_original(&source)
                })
                .await;
                let result = match prepared {
                    Ok(Ok(png)) => service.process_subject(&png, "image/png", &options).await,
                    Ok(Err(err)) => {
                        warn!(%id, error = %err, "could not read original upload");
                        Err(Error::SubjectProcessing(err.to_string()))
                    }
                    Err(err) => Err(Error::SubjectProcessing(err.to_string())),
                };

                let _ = updates_tx
                    .send(SubjectUpdate::Finished { id, options, result })
                    .await;
            }
        }
    }
    Ok(())
}

/// Decode an uploaded photo, apply its EXIF orientation, and re-encode as
/// PNG for the service request.
fn prepare_original(path: &Path) -> Result<Vec<u8>, Error> {
    let img = decode_rgba8_apply_exif(path)?;
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

// Decodes an image to RGBA8 and applies EXIF orientation if available.
// Orientation handling is best-effort; without metadata the original
// orientation is preserved.
fn decode_rgba8_apply_exif(path: &Path) -> Result<image::RgbaImage, Error> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    let mut img = img.to_rgba8();

    let orientation: u16 = read_orientation(path).unwrap_or(1);
    match orientation {
        1 => {}
        2 => {
            img = image::imageops::flip_horizontal(&img);
        }
        3 => {
            img = image::imageops::rotate180(&img);
        }
        4 => {
            img = image::imageops::flip_vertical(&img);
        }
        5 => {
            img = image::imageops::rotate90(&img);
            img = image::imageops::flip_horizontal(&img);
        }
        6 => {
            img = image::imageops::rotate90(&img);
        }
        7 => {
            img = image::imageops::rotate270(&img);
            img = image::imageops::flip_horizontal(&img);
        }
        8 => {
            img = image::imageops::rotate270(&img);
        }
        _ => {}
    }

    Ok(img)
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    if let Some(field) = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY) {
        if let Some(val) = field.value.get_uint(0) {
            let o = val as u16;
            debug!("exif orientation {} for {}", o, path.display());
            return Some(o);
        }
    }
    None
}
