//! Byte-level wire codec.
//!
//! Frame format: 1 type byte, u16 big-endian payload length, payload.
//! A complete message either fits one SingleFrame or is split into
//! MultipartFrameStart (payload = decimal total size) + N MultipartFrame +
//! MultipartFrameFinal. The receiver verifies the reassembled length against
//! the declared total; a short read or early close is a size mismatch, never
//! a silent truncation.
//!
//! Everything is generic over `AsyncRead`/`AsyncWrite` so a TLS stream drops
//! in unchanged.

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtoError;

/// Largest payload one frame can carry (u16 length minus header slack).
pub const MAX_MSG_SIZE: usize = 65532;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    SingleFrame = 50,
    MultipartFrameStart = 51,
    MultipartFrameFinal = 52,
    MultipartFrame = 53,
    SessionSetupRequest = 54,
    SessionSetupResponse = 55,
}

impl FrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            50 => Some(Self::SingleFrame),
            51 => Some(Self::MultipartFrameStart),
            52 => Some(Self::MultipartFrameFinal),
            53 => Some(Self::MultipartFrame),
            54 => Some(Self::SessionSetupRequest),
            55 => Some(Self::SessionSetupResponse),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct DataFrame {
    pub ftype: FrameType,
    pub payload: Vec<u8>,
}

/// Read one frame. Infrastructure errors pass straight through.
pub async fn read_frame<R>(stream: &mut R) -> Result<DataFrame, ProtoError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 3];
    stream.read_exact(&mut header).await?;

    let ftype = FrameType::from_byte(header[0]).ok_or(ProtoError::InvalidFrame(header[0]))?;
    let size = u16::from_be_bytes([header[1], header[2]]) as usize;

    let mut payload = vec![0u8; size];
    stream.read_exact(&mut payload).await?;
    Ok(DataFrame { ftype, payload })
}

/// Write one frame. Fails rather than splitting; splitting is
/// `write_message`'s job.
pub async fn write_frame<W>(
    stream: &mut W,
    ftype: FrameType,
    payload: &[u8],
) -> Result<(), ProtoError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_MSG_SIZE {
        return Err(ProtoError::FrameTooLarge(payload.len()));
    }
    let mut header = [0u8; 3];
    header[0] = ftype as u8;
    header[1..3].copy_from_slice(&(payload.len() as u16).to_be_bytes());
    stream.write_all(&header).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Write a complete message, splitting into a multipart sequence when it
/// exceeds a single frame.
pub async fn write_message<W>(stream: &mut W, data: &[u8]) -> Result<(), ProtoError>
where
    W: AsyncWrite + Unpin,
{
    if data.len() <= MAX_MSG_SIZE {
        return write_frame(stream, FrameType::SingleFrame, data).await;
    }

    let declared = data.len().to_string();
    write_frame(stream, FrameType::MultipartFrameStart, declared.as_bytes()).await?;

    let mut chunks = data.chunks(MAX_MSG_SIZE).peekable();
    while let Some(chunk) = chunks.next() {
        let ftype = if chunks.peek().is_some() {
            FrameType::MultipartFrame
        } else {
            FrameType::MultipartFrameFinal
        };
        write_frame(stream, ftype, chunk).await?;
    }
    Ok(())
}

/// Read a complete message, reassembling multipart sequences and verifying
/// the declared total.
pub async fn read_message<R>(stream: &mut R) -> Result<Vec<u8>, ProtoError>
where
    R: AsyncRead + Unpin,
{
    let first = read_frame(stream).await?;
    match first.ftype {
        FrameType::SingleFrame => Ok(first.payload),
        FrameType::MultipartFrameStart => {
            let declared: usize = std::str::from_utf8(&first.payload)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ProtoError::Schema("bad multipart total size".into()))?;

            let mut assembled: Vec<u8> = Vec::with_capacity(declared.min(1 << 24));
            loop {
                let frame = match read_frame(stream).await {
                    Ok(f) => f,
                    // The peer vanished mid-sequence: report the shortfall,
                    // never hand back a truncated message.
                    Err(ProtoError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                        return Err(ProtoError::SizeMismatch {
                            declared,
                            received: assembled.len(),
                        });
                    }
                    Err(e) => return Err(e),
                };
                match frame.ftype {
                    FrameType::MultipartFrame => assembled.extend_from_slice(&frame.payload),
                    FrameType::MultipartFrameFinal => {
                        assembled.extend_from_slice(&frame.payload);
                        if assembled.len() != declared {
                            return Err(ProtoError::SizeMismatch {
                                declared,
                                received: assembled.len(),
                            });
                        }
                        return Ok(assembled);
                    }
                    other => return Err(ProtoError::InvalidFrame(other as u8)),
                }
            }
        }
        other => Err(ProtoError::InvalidFrame(other as u8)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_frame_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(1 << 20);
        write_message(&mut a, b"hello wire").await.unwrap();
        let got = read_message(&mut b).await.unwrap();
        assert_eq!(got, b"hello wire");
    }

    #[tokio::test]
    async fn multipart_roundtrip_exact() {
        // MAX_MSG_SIZE*2 + 17 forces Start + 2 full frames + final remainder
        let data: Vec<u8> = (0..MAX_MSG_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
        let (mut a, mut b) = tokio::io::duplex(1 << 22);

        let payload = data.clone();
        let writer = tokio::spawn(async move {
            write_message(&mut a, &payload).await.unwrap();
        });
        let got = read_message(&mut b).await.unwrap();
        writer.await.unwrap();
        assert_eq!(got, data);
    }

    #[tokio::test]
    async fn premature_close_is_size_mismatch() {
        let (mut a, mut b) = tokio::io::duplex(1 << 20);
        // Declare a large total, send one partial chunk, then hang up.
        write_frame(&mut a, FrameType::MultipartFrameStart, b"100000")
            .await
            .unwrap();
        write_frame(&mut a, FrameType::MultipartFrame, &[0u8; 1000])
            .await
            .unwrap();
        drop(a);

        match read_message(&mut b).await {
            Err(ProtoError::SizeMismatch { declared, received }) => {
                assert_eq!(declared, 100000);
                assert_eq!(received, 1000);
            }
            other => panic!("expected SizeMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn declared_total_enforced() {
        let (mut a, mut b) = tokio::io::duplex(1 << 20);
        write_frame(&mut a, FrameType::MultipartFrameStart, b"5000")
            .await
            .unwrap();
        write_frame(&mut a, FrameType::MultipartFrameFinal, &[0u8; 10])
            .await
            .unwrap();
        assert!(matches!(
            read_message(&mut b).await,
            Err(ProtoError::SizeMismatch { declared: 5000, received: 10 })
        ));
    }

    #[tokio::test]
    async fn oversized_frame_rejected_at_write() {
        let (mut a, _b) = tokio::io::duplex(1 << 20);
        let big = vec![0u8; MAX_MSG_SIZE + 1];
        assert!(matches!(
            write_frame(&mut a, FrameType::SingleFrame, &big).await,
            Err(ProtoError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn unknown_frame_type_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1 << 20);
        use tokio::io::AsyncWriteExt;
        a.write_all(&[99u8, 0, 0]).await.unwrap();
        assert!(matches!(
            read_message(&mut b).await,
            Err(ProtoError::InvalidFrame(99))
        ));
    }
}
