//! File recording output
//!
//! Records emitted payloads to disk without touching them: H.264/H.265 as a
//! raw Annex-B elementary stream, VP8/VP9/AV1 wrapped in IVF.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::error::{PassthruError, Result};
use crate::host::EncodedImage;
use crate::types::Codec;

use super::EmittedImage;

/// IVF timebase denominator (RTP video clock)
const IVF_TIMEBASE_RATE: u32 = 90_000;
const IVF_HEADER_LEN: u16 = 32;
/// Offset of the frame count in the IVF header
const IVF_FRAME_COUNT_OFFSET: u64 = 24;

/// On-disk layout for a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Concatenated Annex-B access units
    AnnexB,
    /// IVF frame container
    Ivf,
}

impl ContainerFormat {
    pub fn for_codec(codec: Codec) -> Self {
        match codec.ivf_fourcc() {
            Some(_) => Self::Ivf,
            None => Self::AnnexB,
        }
    }
}

/// Writes emitted images to a file
pub struct FileRecorder {
    /// Output path
    path: PathBuf,
    writer: BufWriter<File>,
    format: ContainerFormat,
    frames_written: u64,
    bytes_written: u64,
}

impl FileRecorder {
    /// Create the file and write the container header
    pub fn new(path: impl Into<PathBuf>, codec: Codec, width: u32, height: u32) -> Result<Self> {
        let path = path.into();
        let format = ContainerFormat::for_codec(codec);

        let file = File::create(&path).map_err(|e| {
            PassthruError::Io(e).with_context(format!("Failed to create {}", path.display()))
        })?;
        let mut writer = BufWriter::new(file);

        if let Some(fourcc) = codec.ivf_fourcc() {
            write_ivf_header(&mut writer, fourcc, width, height)?;
        }

        info!(
            "Recording {} {}x{} to {:?} ({:?})",
            codec, width, height, path, format
        );

        Ok(Self {
            path,
            writer,
            format,
            frames_written: 0,
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append one image
    ///
    /// Empty payloads are rejected; IVF has no way to represent them.
    pub fn write_image(&mut self, image: &EncodedImage) -> Result<()> {
        if image.data.is_empty() {
            return Err(PassthruError::EmptyPayload);
        }
        if self.format == ContainerFormat::Ivf {
            self.writer
                .write_all(&(image.data.len() as u32).to_le_bytes())?;
            self.writer
                .write_all(&u64::from(image.rtp_timestamp).to_le_bytes())?;
        }
        self.writer.write_all(&image.data)?;

        self.frames_written += 1;
        self.bytes_written += image.data.len() as u64;
        Ok(())
    }

    /// Flush, patch the IVF frame count and close the file
    pub fn finalize(self) -> Result<u64> {
        let frames = self.frames_written;
        let mut file = self.writer.into_inner().map_err(|e| e.into_error())?;

        if self.format == ContainerFormat::Ivf {
            file.seek(SeekFrom::Start(IVF_FRAME_COUNT_OFFSET))?;
            file.write_all(&(frames as u32).to_le_bytes())?;
        }
        file.sync_all()?;

        info!(
            "Recording finalized: {:?} ({} frames, {} bytes)",
            self.path, frames, self.bytes_written
        );
        Ok(frames)
    }
}

fn write_ivf_header(writer: &mut impl Write, fourcc: [u8; 4], width: u32, height: u32) -> Result<()> {
    let mut header = Vec::with_capacity(IVF_HEADER_LEN as usize);
    header.extend_from_slice(b"DKIF");
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&IVF_HEADER_LEN.to_le_bytes());
    header.extend_from_slice(&fourcc);
    header.extend_from_slice(&(width as u16).to_le_bytes());
    header.extend_from_slice(&(height as u16).to_le_bytes());
    header.extend_from_slice(&IVF_TIMEBASE_RATE.to_le_bytes());
    header.extend_from_slice(&1u32.to_le_bytes());
    // Frame count, patched in finalize()
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    writer.write_all(&header)?;
    Ok(())
}

/// Async task recording every image published on a [`ChannelSink`](super::ChannelSink)
///
/// Runs until the channel closes, then finalizes the file. Stops at the
/// first failed write and returns that error; the file is left as written.
pub async fn record_from_channel(
    mut recorder: FileRecorder,
    mut rx: broadcast::Receiver<Arc<EmittedImage>>,
) -> Result<u64> {
    loop {
        match rx.recv().await {
            Ok(emitted) => {
                if let Err(e) = recorder.write_image(&emitted.image) {
                    error!(
                        "Failed to write image {} to {:?}: {}",
                        recorder.frames_written(),
                        recorder.path(),
                        e
                    );
                    return Err(e.with_context(format!(
                        "recording stopped after {} frame(s)",
                        recorder.frames_written()
                    )));
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Image channel closed, finalizing recording");
                break;
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Recording dropped {} images due to lag", n);
            }
        }
    }

    recorder.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CodecSpecificInfo;
    use crate::types::{FrameType, VideoRotation};
    use bytes::Bytes;

    fn image(data: &'static [u8], rtp: u32) -> EncodedImage {
        EncodedImage {
            data: Bytes::from_static(data),
            encoded_width: 320,
            encoded_height: 240,
            rtp_timestamp: rtp,
            capture_time_ms: 0,
            ntp_time_ms: 0,
            rotation: VideoRotation::Deg0,
            color_space: None,
            frame_type: FrameType::Delta,
            simulcast_index: None,
            has_parameter_sets: false,
        }
    }

    #[test]
    fn test_annexb_is_concatenated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.h264");

        let mut recorder = FileRecorder::new(&path, Codec::H264, 320, 240).unwrap();
        recorder.write_image(&image(b"\x00\x00\x01\x65", 0)).unwrap();
        recorder.write_image(&image(b"\x00\x00\x01\x41", 3000)).unwrap();
        assert_eq!(recorder.finalize().unwrap(), 2);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, b"\x00\x00\x01\x65\x00\x00\x01\x41");
    }

    #[test]
    fn test_ivf_header_and_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ivf");

        let mut recorder = FileRecorder::new(&path, Codec::Vp8, 320, 240).unwrap();
        assert_eq!(recorder.format(), ContainerFormat::Ivf);
        recorder.write_image(&image(b"\xAA\xBB", 90)).unwrap();
        recorder.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"DKIF");
        assert_eq!(&bytes[8..12], b"VP80");
        assert_eq!(u16::from_le_bytes([bytes[12], bytes[13]]), 320);
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(bytes[32..36].try_into().unwrap()), 2);
        assert_eq!(u64::from_le_bytes(bytes[36..44].try_into().unwrap()), 90);
        assert_eq!(&bytes[44..], b"\xAA\xBB");
    }

    fn emitted(data: &'static [u8], rtp: u32) -> Arc<EmittedImage> {
        Arc::new(EmittedImage {
            image: image(data, rtp),
            info: CodecSpecificInfo {
                codec: Codec::Vp8,
                packetization_mode: None,
                temporal_index: None,
                idr_frame: false,
            },
        })
    }

    #[tokio::test]
    async fn test_recording_from_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ivf");
        let recorder = FileRecorder::new(&path, Codec::Vp8, 320, 240).unwrap();

        let (tx, rx) = broadcast::channel(8);
        tx.send(emitted(b"\x01", 0)).unwrap();
        tx.send(emitted(b"\x02\x03", 3000)).unwrap();
        drop(tx);

        assert_eq!(record_from_channel(recorder, rx).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_recording_stops_on_failed_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ivf");
        let recorder = FileRecorder::new(&path, Codec::Vp8, 320, 240).unwrap();

        let (tx, rx) = broadcast::channel(8);
        tx.send(emitted(b"\x01", 0)).unwrap();
        tx.send(emitted(b"", 3000)).unwrap();
        tx.send(emitted(b"\x02", 6000)).unwrap();
        drop(tx);

        let err = record_from_channel(recorder, rx).await.unwrap_err();
        assert!(err.to_string().contains("after 1 frame(s)"));
        assert!(matches!(
            err,
            PassthruError::WithContext { ref source, .. } if matches!(**source, PassthruError::EmptyPayload)
        ));
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder =
            FileRecorder::new(dir.path().join("out.h264"), Codec::H264, 320, 240).unwrap();
        assert!(matches!(
            recorder.write_image(&image(b"", 0)),
            Err(PassthruError::EmptyPayload)
        ));
        assert_eq!(recorder.frames_written(), 0);
    }
}
