// lecture-dl - Course Media Downloader
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Widevine key-ID extraction
//!
//! # PSSH Box Layout
//! - 4 bytes: Box size
//! - 4 bytes: Box type ("pssh")
//! - 1 byte: Version
//! - 3 bytes: Flags
//! - 16 bytes: System ID (Widevine UUID)
//! - version 1 only: 4 bytes KID count, then 16 bytes per KID
//! - 4 bytes: Data size
//! - N bytes: Data (WidevinePsshData protobuf)
//!
//! The extractor walks the top-level boxes of the container, descends into `moov`,
//! and returns the `content_id` of the first Widevine PSSH, base16-encoded in
//! uppercase. No Widevine PSSH means the track is not encrypted: `Ok(None)`.

use crate::error::{DownloadError, Result};
use prost::Message;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use uuid::Uuid;

/// Widevine system ID `edef8ba9-79d6-4ace-a3c8-27dcd51d21ed`
pub const WIDEVINE_SYSTEM_ID: Uuid = Uuid::from_u128(0xedef8ba9_79d6_4ace_a3c8_27dcd51d21ed);

/// Refuse to buffer a `moov` box larger than this
const MAX_MOOV_SIZE: u64 = 64 * 1024 * 1024;

/// Boxes inside `moov` that may carry a PSSH further down
const CONTAINER_BOXES: [&[u8; 4]; 4] = [b"trak", b"mdia", b"minf", b"stbl"];

/// Widevine PSSH payload
///
/// Only the identification fields are declared; other fields are skipped on decode.
#[derive(Clone, PartialEq, Message)]
pub struct WidevinePsshData {
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub key_ids: Vec<Vec<u8>>,
    #[prost(string, optional, tag = "3")]
    pub provider: Option<String>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub content_id: Option<Vec<u8>>,
}

/// Parsed `pssh` box
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsshBox {
    pub version: u8,
    pub system_id: Uuid,
    /// KIDs listed in the box header (version 1)
    pub key_ids: Vec<[u8; 16]>,
    pub data: Vec<u8>,
}

impl PsshBox {
    pub fn is_widevine(&self) -> bool {
        self.system_id == WIDEVINE_SYSTEM_ID
    }

    /// Key-ID of this PSSH
    ///
    /// `content_id` first; then the first protobuf `key_id`; then the first
    /// header KID of a version 1 box.
    pub fn key_id(&self) -> Result<Option<String>> {
        let payload = WidevinePsshData::decode(self.data.as_slice())?;

        let raw = payload
            .content_id
            .filter(|id| !id.is_empty())
            .or_else(|| payload.key_ids.into_iter().find(|id| !id.is_empty()))
            .or_else(|| self.key_ids.first().map(|kid| kid.to_vec()));

        Ok(raw.map(hex::encode_upper))
    }
}

/// Extract the Widevine key-ID of a container file
pub async fn extract_key_id(container_path: &Path) -> Result<Option<String>> {
    let mut file = File::open(container_path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DownloadError::FileNotFound(container_path.display().to_string())
        } else {
            e.into()
        }
    })?;
    let file_len = file.metadata().await?.len();

    let mut position = 0u64;
    while position + 8 <= file_len {
        file.seek(SeekFrom::Start(position)).await?;
        let mut header = [0u8; 8];
        file.read_exact(&mut header).await?;

        let mut size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let box_type = [header[4], header[5], header[6], header[7]];
        let mut header_len = 8u64;

        if size == 1 {
            let mut large = [0u8; 8];
            file.read_exact(&mut large).await?;
            size = u64::from_be_bytes(large);
            header_len = 16;
        } else if size == 0 {
            size = file_len - position;
        }

        if size < header_len || size > file_len - position {
            return Err(DownloadError::InvalidContainer(format!(
                "{}: box '{}' at {} has invalid size {}",
                container_path.display(),
                String::from_utf8_lossy(&box_type),
                position,
                size
            )));
        }

        if &box_type == b"moov" {
            let body_len = size - header_len;
            if body_len > MAX_MOOV_SIZE {
                return Err(DownloadError::InvalidContainer(format!(
                    "{}: moov box too large ({} bytes)",
                    container_path.display(),
                    body_len
                )));
            }
            let mut body = vec![0u8; body_len as usize];
            file.read_exact(&mut body).await?;
            return key_id_from_moov(&body);
        }

        position += size;
    }

    Ok(None)
}

/// Find the first Widevine PSSH under a `moov` body and return its key-ID
pub fn key_id_from_moov(moov_body: &[u8]) -> Result<Option<String>> {
    match find_widevine_pssh(moov_body)? {
        Some(pssh) => pssh.key_id(),
        None => Ok(None),
    }
}

fn find_widevine_pssh(body: &[u8]) -> Result<Option<PsshBox>> {
    for (box_type, payload) in BoxIter::new(body) {
        let payload = payload?;
        if &box_type == b"pssh" {
            let pssh = parse_pssh_box(payload)?;
            if pssh.is_widevine() {
                return Ok(Some(pssh));
            }
        } else if CONTAINER_BOXES.contains(&&box_type) {
            if let Some(pssh) = find_widevine_pssh(payload)? {
                return Ok(Some(pssh));
            }
        }
    }
    Ok(None)
}

/// Parse the body of a `pssh` full box (everything after the 8-byte header)
pub fn parse_pssh_box(body: &[u8]) -> Result<PsshBox> {
    let mut reader = ByteReader::new(body);

    let version = reader.u8()?;
    reader.skip(3)?; // flags
    let system_id = Uuid::from_bytes(reader.array::<16>()?);

    let mut key_ids = Vec::new();
    if version > 0 {
        let count = reader.u32()?;
        for _ in 0..count {
            key_ids.push(reader.array::<16>()?);
        }
    }

    let data_len = reader.u32()? as usize;
    let data = reader.take(data_len)?.to_vec();

    Ok(PsshBox {
        version,
        system_id,
        key_ids,
        data,
    })
}

/// Iterator over `(type, body)` of the boxes packed in a buffer
struct BoxIter<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BoxIter<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = ([u8; 4], Result<&'a [u8]>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + 8 > self.buf.len() {
            return None;
        }
        let header = &self.buf[self.pos..self.pos + 8];
        let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let box_type = [header[4], header[5], header[6], header[7]];

        let size = if size == 0 { self.buf.len() - self.pos } else { size };
        if size < 8 || size > self.buf.len() - self.pos {
            self.pos = self.buf.len();
            return Some((
                box_type,
                Err(DownloadError::InvalidContainer(format!(
                    "box '{}' has invalid size {}",
                    String::from_utf8_lossy(&box_type),
                    size
                ))),
            ));
        }

        let body = &self.buf[self.pos + 8..self.pos + size];
        self.pos += size;
        Some((box_type, Ok(body)))
    }
}

/// Big-endian cursor over a byte slice
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(DownloadError::InvalidContainer(format!(
                "pssh box truncated: wanted {} bytes at offset {}, have {}",
                len,
                self.pos,
                self.buf.len()
            ))),
        }
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_extract_content_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lecture.encrypted.mp4");
        tokio::fs::write(&path, encrypted_container(&[0xab, 0xc1, 0x23]))
            .await
            .unwrap();

        assert_eq!(extract_key_id(&path).await.unwrap().as_deref(), Some("ABC123"));
    }

    #[tokio::test]
    async fn test_unencrypted_container_has_no_key_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.mp4");
        let mut file = mp4_box(b"ftyp", b"isom\0\0\0\x01");
        file.extend(mp4_box(b"moov", &mp4_box(b"mvhd", &[0u8; 100])));
        tokio::fs::write(&path, file).await.unwrap();

        assert_eq!(extract_key_id(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_largesize_box_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.mp4");
        let mut file = mp4_box(b"ftyp", b"isom\0\0\0\x01");
        file.extend_from_slice(&1u32.to_be_bytes());
        file.extend_from_slice(b"mdat");
        file.extend_from_slice(&u64::MAX.to_be_bytes());
        file.extend_from_slice(&[0u8; 32]);
        tokio::fs::write(&path, file).await.unwrap();

        assert!(matches!(
            extract_key_id(&path).await,
            Err(DownloadError::InvalidContainer(_))
        ));
    }

    #[test]
    fn test_non_widevine_pssh_ignored() {
        let playready = Uuid::from_u128(0x9a04f079_9840_4286_ab92_e65be0885f95);
        let payload = WidevinePsshData {
            key_ids: vec![],
            provider: None,
            content_id: Some(vec![1, 2, 3]),
        };
        let moov = pssh(playready, &[], &payload);

        assert_eq!(key_id_from_moov(&moov).unwrap(), None);
    }

    #[test]
    fn test_pssh_nested_in_trak() {
        let payload = WidevinePsshData {
            key_ids: vec![],
            provider: None,
            content_id: Some(vec![0x0f, 0xee]),
        };
        let trak = mp4_box(b"trak", &pssh(WIDEVINE_SYSTEM_ID, &[], &payload));

        assert_eq!(key_id_from_moov(&trak).unwrap().as_deref(), Some("0FEE"));
    }

    #[test]
    fn test_key_id_fallbacks() {
        let from_protobuf = WidevinePsshData {
            key_ids: vec![vec![0xde, 0xad]],
            provider: None,
            content_id: None,
        };
        let moov = pssh(WIDEVINE_SYSTEM_ID, &[], &from_protobuf);
        assert_eq!(key_id_from_moov(&moov).unwrap().as_deref(), Some("DEAD"));

        let empty = WidevinePsshData {
            key_ids: vec![],
            provider: None,
            content_id: None,
        };
        let moov = pssh(WIDEVINE_SYSTEM_ID, &[[0x11; 16]], &empty);
        assert_eq!(
            key_id_from_moov(&moov).unwrap().as_deref(),
            Some("11111111111111111111111111111111")
        );
    }

    #[test]
    fn test_truncated_pssh_is_error() {
        let body = [0u8, 0, 0, 0, 0xed, 0xef];
        assert!(matches!(
            parse_pssh_box(&body),
            Err(DownloadError::InvalidContainer(_))
        ));
    }
}
