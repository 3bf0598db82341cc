//! Integration test for a course download
//!
//! Runs a mixed queue (assets, subtitle, external link, DRM-protected lecture)
//! against a local HTTP server. External tools are replaced by stages that
//! write real MP4 box structures, so key-ID extraction runs on actual files.

use async_trait::async_trait;
use lecture_dl::crypto::keys::KeyDecryptorMap;
use lecture_dl::crypto::widevine::{self, WidevinePsshData, WIDEVINE_SYSTEM_ID};
use lecture_dl::download::{
    ChunkedFetcher, DownloadQueue, DownloadTarget, Downloadable, EncryptedStream, MediaKind,
};
use lecture_dl::error::{DownloadError, Result};
use lecture_dl::pipeline::{
    decrypt_all_sources, EncryptedStreamPipeline, PipelineOptions, PipelineStages,
};
use prost::Message;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn mp4_box(box_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(box_type);
    out.extend_from_slice(body);
    out
}

/// Minimal fragmented-MP4 header carrying a Widevine PSSH with `content_id`
fn protected_track(content_id: &[u8]) -> Vec<u8> {
    let payload = WidevinePsshData {
        key_ids: vec![],
        provider: None,
        content_id: Some(content_id.to_vec()),
    }
    .encode_to_vec();

    let mut pssh = vec![0u8, 0, 0, 0];
    pssh.extend_from_slice(WIDEVINE_SYSTEM_ID.as_bytes());
    pssh.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    pssh.extend_from_slice(&payload);

    let mut file = mp4_box(b"ftyp", b"dash\0\0\0\0iso6");
    file.extend(mp4_box(b"moov", &mp4_box(b"pssh", &pssh)));
    file.extend(mp4_box(b"mdat", &[0u8; 32]));
    file
}

/// Stages that fake the external tools but keep real key extraction
#[derive(Default)]
struct FileStages {
    decrypted: Mutex<Vec<String>>,
}

#[async_trait]
impl PipelineStages for FileStages {
    async fn download_segments(&self, _stream: &EncryptedStream, base: &Path) -> Result<()> {
        let base = base.to_string_lossy();
        tokio::fs::write(format!("{}.encrypted.mp4", base), protected_track(&[0xab, 0xc1, 0x23])).await?;
        tokio::fs::write(format!("{}.encrypted.m4a", base), protected_track(&[0xab, 0xc1, 0x23])).await?;
        Ok(())
    }

    async fn extract_key_id(&self, encrypted: &Path) -> Result<Option<String>> {
        widevine::extract_key_id(encrypted).await
    }

    async fn decrypt(&self, keys: &KeyDecryptorMap, key_id: &str, input: &Path, output: &Path) -> Result<()> {
        let key = keys.require(key_id)?;
        self.decrypted.lock().unwrap().push(format!("{}={}", key_id, key));
        tokio::fs::copy(input, output).await?;
        Ok(())
    }

    async fn mux(&self, _title: &str, inputs: &[&Path], output: &Path) -> Result<()> {
        let mut merged = Vec::new();
        for input in inputs {
            merged.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(output, merged).await?;
        Ok(())
    }
}

fn keys() -> Arc<KeyDecryptorMap> {
    Arc::new(KeyDecryptorMap::parse(r#"{"abc123": "00112233445566778899aabbccddeeff"}"#).unwrap())
}

#[tokio::test]
async fn test_course_queue_end_to_end() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/assets/slides.pdf")
        .match_header("range", "bytes=4-")
        .with_status(206)
        .with_body("-rest")
        .create_async()
        .await;
    server
        .mock("GET", "/captions/intro.vtt")
        .with_status(200)
        .with_body("WEBVTT\n\n00:00.000 --> 00:01.000\nHello\n")
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let chapter = dir.path().join("01 - Getting Started");
    tokio::fs::create_dir_all(&chapter).await.unwrap();
    // Left behind by an interrupted run
    tokio::fs::write(chapter.join("Slides.pdf.part"), b"head").await.unwrap();

    let items: Vec<Downloadable> = vec![
        DownloadTarget::new(
            MediaKind::Asset,
            &format!("{}/assets/slides.pdf", server.url()),
            &chapter,
            "Slides",
            "pdf",
        )
        .unwrap()
        .into(),
        DownloadTarget::subtitle(
            &format!("{}/captions/intro.vtt", server.url()),
            &chapter,
            "01 Intro",
            "en_US",
            "vtt",
        )
        .unwrap()
        .into(),
        DownloadTarget::new(MediaKind::ExternalLink, "https://crates.io/", &chapter, "Crates", "txt")
            .unwrap()
            .into(),
        EncryptedStream::new("https://cdn.example.com/intro/index.mpd", "bv+ba", "01 Intro", &chapter)
            .unwrap()
            .into(),
    ];

    let queue = DownloadQueue::new(
        ChunkedFetcher::new(reqwest::Client::new()),
        EncryptedStreamPipeline::new(FileStages::default(), keys(), PipelineOptions::default()),
    );
    let summary = queue.run_until(&items, std::future::pending()).await.unwrap();

    assert!(summary.failed.is_empty(), "{:?}", summary.failed);
    assert_eq!(summary.downloaded, 3);
    assert_eq!(summary.links_recorded, 1);

    assert_eq!(
        tokio::fs::read_to_string(chapter.join("Slides.pdf")).await.unwrap(),
        "head-rest"
    );
    assert!(chapter.join("01 Intro.en_US.vtt").exists());
    assert!(chapter.join("01 Intro.mp4").exists());
    assert!(!chapter.join("01 Intro.encrypted.mp4").exists());
    assert!(!chapter.join("01 Intro.decrypted.m4a").exists());

    let decrypted = queue.pipeline().stages().decrypted.lock().unwrap().clone();
    assert_eq!(
        decrypted,
        vec![
            "ABC123=00112233445566778899aabbccddeeff",
            "ABC123=00112233445566778899aabbccddeeff",
        ]
    );

    // Second run touches nothing
    let again = queue.run_until(&items, std::future::pending()).await.unwrap();
    assert_eq!(again.already_downloaded, 3);
    assert_eq!(again.links_recorded, 1);
}

#[tokio::test]
async fn test_missing_key_then_batch_decrypt() {
    let dir = TempDir::new().unwrap();
    let stream = EncryptedStream::new("https://cdn.example.com/l/index.mpd", "bv+ba", "02 Traits", dir.path()).unwrap();

    // First run without keys keeps the encrypted tracks
    let no_keys = EncryptedStreamPipeline::new(
        FileStages::default(),
        Arc::new(KeyDecryptorMap::default()),
        PipelineOptions::default(),
    );
    assert!(no_keys.run(&stream).await.is_success());
    assert!(dir.path().join("02 Traits.encrypted.m4a").exists());
    assert!(!dir.path().join("02 Traits.mp4").exists());

    // Wrong keyfile: lecture fails with KeyNotFound, nothing is deleted
    let wrong = EncryptedStreamPipeline::new(
        FileStages::default(),
        Arc::new(KeyDecryptorMap::new([("def456", "ff")])),
        PipelineOptions::default(),
    );
    let summary = decrypt_all_sources(&wrong, dir.path()).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert!(dir.path().join("02 Traits.encrypted.mp4").exists());

    // Right keyfile finishes the lecture and clears intermediates
    let right = EncryptedStreamPipeline::new(FileStages::default(), keys(), PipelineOptions::default());
    let summary = decrypt_all_sources(&right, dir.path()).await.unwrap();
    assert_eq!(summary.completed, 1);
    assert!(dir.path().join("02 Traits.mp4").exists());
    assert!(!dir.path().join("02 Traits.encrypted.mp4").exists());
    assert!(!dir.path().join("02 Traits.encrypted.m4a").exists());
}

#[test]
fn test_unknown_kind_rejected() {
    assert!(matches!(
        "dash".parse::<MediaKind>(),
        Err(DownloadError::InvalidConfiguration(_))
    ));
}
