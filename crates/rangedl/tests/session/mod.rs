use std::{
    num::NonZeroU32,
    path::Path,
    sync::{Arc, Mutex},
};

use rangedl::{
    util::http::{build_client, DEFAULT_USER_AGENT},
    HttpSegmentFetcher, Manifest, RangedlError, Session, TrackKind,
};
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::common::{init_test_tracing, variant, MemoryFetcher, RecordingMuxer};

const PLAYLIST_URL: &str =
    "https://cdn.example.com/exp=1~acl=x~hmac=y/c0ffee/v2/playlist/av/primary/playlist.json";
const BASE_URL: &str = "https://cdn.example.com/exp=1~acl=x~hmac=y/c0ffee/v2/range/prot/";

fn manifest() -> Manifest {
    Manifest {
        video: vec![
            variant("v360", "height", 360, b"V360INIT", &["v360/0.mp4"]),
            variant(
                "v720",
                "height",
                720,
                b"V720INIT",
                &["v720/0.mp4", "v720/1.mp4", "v720/2.mp4"],
            ),
        ],
        audio: vec![
            variant("a64", "bitrate", 64, b"A64INIT", &["a64/0.mp4"]),
            variant("a128", "bitrate", 128, b"A128INIT", &["a128/0.mp4", "a128/1.mp4"]),
        ],
    }
}

fn fetcher() -> MemoryFetcher {
    MemoryFetcher::new()
        .segment(format!("{BASE_URL}v720/0.mp4"), "|v0")
        .segment(format!("{BASE_URL}v720/1.mp4"), "|v1")
        .segment(format!("{BASE_URL}v720/2.mp4"), "|v2")
        .segment(format!("{BASE_URL}a128/0.mp4"), "|a0")
        .segment(format!("{BASE_URL}a128/1.mp4"), "|a1")
}

fn assert_removed(dir: &Path) {
    assert!(!dir.exists(), "{} should be removed", dir.display());
}

#[tokio::test]
async fn test_session_downloads_best_tracks() -> anyhow::Result<()> {
    init_test_tracing();
    let root = tempfile::tempdir()?;
    let work_dir = root.path().join("work");
    let output = root.path().join("video.mp4");

    let fetcher = fetcher();
    let requested = fetcher.requested.clone();
    let muxer = RecordingMuxer::default();
    let session = Session::new(fetcher, muxer.clone(), &work_dir)
        .concurrency(NonZeroU32::new(2).unwrap());

    let result = session.run(&manifest(), PLAYLIST_URL, &output).await?;
    assert_eq!(result, output);

    // video track first, then audio
    assert_eq!(
        tokio::fs::read_to_string(&output).await?,
        "V720INIT|v0|v1|v2A128INIT|a0|a1"
    );

    let calls = muxer.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let (video, audio, muxed) = &calls[0];
    assert_eq!(video, &work_dir.join("v720_video_FULL.mp4"));
    assert_eq!(audio, &work_dir.join("a128_audio_FULL.mp4"));
    assert_eq!(muxed, &output);

    let requested = requested.lock().unwrap();
    assert_eq!(requested.len(), 5);
    assert!(requested.iter().all(|url| url.starts_with(BASE_URL)));
    assert!(!requested.iter().any(|url| url.contains("v360") || url.contains("a64")));

    assert_removed(&work_dir);

    Ok(())
}

#[tokio::test]
async fn test_session_reports_progress() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let work_dir = root.path().join("work");
    let output = root.path().join("video.mp4");

    let progresses = Arc::new(Mutex::new(Vec::new()));
    let progresses_inner = progresses.clone();
    let session = Session::new(fetcher(), RecordingMuxer::default(), &work_dir)
        .concurrency(NonZeroU32::new(1).unwrap())
        .on_progress(move |progress| progresses_inner.lock().unwrap().push(*progress));
    session.run(&manifest(), PLAYLIST_URL, &output).await?;

    // one worker per track, so snapshots arrive in order
    let progresses = progresses.lock().unwrap();
    let counters: Vec<_> = progresses
        .iter()
        .map(|p| (p.succeeded, p.completed, p.total, p.bytes))
        .collect();
    assert_eq!(
        counters,
        vec![
            (1, 1, 3, 3),
            (2, 2, 3, 6),
            (3, 3, 3, 9),
            (1, 1, 2, 3),
            (2, 2, 2, 6),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_session_variant_id_stays_in_work_dir() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let parent = root.path().join("parent");
    let work_dir = parent.join("work");
    let output = root.path().join("video.mp4");

    let mut manifest = manifest();
    manifest.video[1].id = "../escape".to_string();
    manifest.audio[1].id = "nested/a128".to_string();

    let muxer = RecordingMuxer::default();
    let session = Session::new(fetcher(), muxer.clone(), &work_dir).keep_temp(true);
    session.run(&manifest, PLAYLIST_URL, &output).await?;

    assert_eq!(
        tokio::fs::read_to_string(&output).await?,
        "V720INIT|v0|v1|v2A128INIT|a0|a1"
    );
    let calls = muxer.calls.lock().unwrap().clone();
    assert_eq!(calls[0].0, work_dir.join("..__escape_video_FULL.mp4"));
    assert_eq!(calls[0].1, work_dir.join("nested__a128_audio_FULL.mp4"));

    // nothing was written next to the work dir
    let mut siblings = Vec::new();
    let mut entries = tokio::fs::read_dir(&parent).await?;
    while let Some(entry) = entries.next_entry().await? {
        siblings.push(entry.file_name().to_string_lossy().into_owned());
    }
    assert_eq!(siblings, vec!["work"]);

    Ok(())
}

#[tokio::test]
async fn test_session_cancelled() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let work_dir = root.path().join("work");
    let output = root.path().join("video.mp4");

    let fetcher = fetcher();
    let requested = fetcher.requested.clone();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let muxer = RecordingMuxer::default();
    let session = Session::new(fetcher, muxer.clone(), &work_dir).cancel_token(cancel);
    let result = session.run(&manifest(), PLAYLIST_URL, &output).await;

    assert!(matches!(result, Err(RangedlError::Cancelled)));
    assert!(requested.lock().unwrap().is_empty());
    assert_eq!(muxer.call_count(), 0);
    assert!(!output.exists());
    assert_removed(&work_dir);

    Ok(())
}

#[tokio::test]
async fn test_session_cancelled_mid_download() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let work_dir = root.path().join("work");
    let output = root.path().join("video.mp4");

    let cancel = CancellationToken::new();
    let muxer = RecordingMuxer::default();
    let session = Session::new(
        fetcher().delay(std::time::Duration::from_secs(60)),
        muxer.clone(),
        &work_dir,
    )
    .cancel_token(cancel.clone());

    let cancel_inner = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel_inner.cancel();
    });
    let result = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        session.run(&manifest(), PLAYLIST_URL, &output),
    )
    .await?;

    assert!(matches!(result, Err(RangedlError::Cancelled)));
    assert_eq!(muxer.call_count(), 0);
    assert_removed(&work_dir);

    Ok(())
}

#[tokio::test]
async fn test_session_missing_video_segment() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let work_dir = root.path().join("work");
    let output = root.path().join("video.mp4");

    let fetcher = MemoryFetcher::new()
        .segment(format!("{BASE_URL}v720/0.mp4"), "|v0")
        .segment(format!("{BASE_URL}v720/2.mp4"), "|v2")
        .segment(format!("{BASE_URL}a128/0.mp4"), "|a0")
        .segment(format!("{BASE_URL}a128/1.mp4"), "|a1");
    let requested = fetcher.requested.clone();
    let muxer = RecordingMuxer::default();
    let session = Session::new(fetcher, muxer.clone(), &work_dir);

    let result = session.run(&manifest(), PLAYLIST_URL, &output).await;

    assert!(matches!(result, Err(RangedlError::MissingSegment(1))));
    // audio track is still downloaded
    let requested = requested.lock().unwrap();
    assert!(requested.iter().any(|url| url.ends_with("a128/0.mp4")));
    assert!(requested.iter().any(|url| url.ends_with("a128/1.mp4")));

    assert_eq!(muxer.call_count(), 0);
    assert!(!output.exists());
    assert_removed(&work_dir);

    Ok(())
}

#[tokio::test]
async fn test_session_missing_audio_segment() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let work_dir = root.path().join("work");
    let output = root.path().join("video.mp4");

    let fetcher = MemoryFetcher::new()
        .segment(format!("{BASE_URL}v720/0.mp4"), "|v0")
        .segment(format!("{BASE_URL}v720/1.mp4"), "|v1")
        .segment(format!("{BASE_URL}v720/2.mp4"), "|v2")
        .segment(format!("{BASE_URL}a128/1.mp4"), "|a1");
    let muxer = RecordingMuxer::default();
    let session = Session::new(fetcher, muxer.clone(), &work_dir);

    let result = session.run(&manifest(), PLAYLIST_URL, &output).await;

    assert!(matches!(result, Err(RangedlError::MissingSegment(0))));
    assert_eq!(muxer.call_count(), 0);
    assert_removed(&work_dir);

    Ok(())
}

#[tokio::test]
async fn test_session_empty_audio() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let work_dir = root.path().join("work");
    let output = root.path().join("video.mp4");

    let mut manifest = manifest();
    manifest.audio.clear();

    let muxer = RecordingMuxer::default();
    let session = Session::new(fetcher(), muxer.clone(), &work_dir);
    let result = session.run(&manifest, PLAYLIST_URL, &output).await;

    assert!(matches!(
        result,
        Err(RangedlError::EmptyVariantList(TrackKind::Audio))
    ));
    assert_eq!(muxer.call_count(), 0);
    assert_removed(&work_dir);

    Ok(())
}

#[tokio::test]
async fn test_session_mux_failure() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let work_dir = root.path().join("work");
    let output = root.path().join("video.mp4");

    let muxer = RecordingMuxer::failing();
    let session = Session::new(fetcher(), muxer.clone(), &work_dir);
    let result = session.run(&manifest(), PLAYLIST_URL, &output).await;

    match result {
        Err(RangedlError::MuxFailure { code, stderr }) => {
            assert_eq!(code, Some(1));
            assert!(stderr.contains("Invalid data"));
        }
        other => panic!("expected mux failure, got {other:?}"),
    }
    assert_eq!(muxer.call_count(), 1);
    assert_removed(&work_dir);

    Ok(())
}

#[tokio::test]
async fn test_session_keep_temp() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let work_dir = root.path().join("work");
    let output = root.path().join("video.mp4");

    let session = Session::new(fetcher(), RecordingMuxer::default(), &work_dir).keep_temp(true);
    session.run(&manifest(), PLAYLIST_URL, &output).await?;

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(&work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        files.push(entry.file_name().to_string_lossy().into_owned());
    }
    files.sort();
    // segments are always removed, merged tracks are kept
    assert_eq!(files, vec!["a128_audio_FULL.mp4", "v720_video_FULL.mp4"]);
    assert_eq!(
        tokio::fs::read(work_dir.join("v720_video_FULL.mp4")).await?,
        b"V720INIT|v0|v1|v2"
    );

    Ok(())
}

#[tokio::test]
async fn test_session_over_http() -> anyhow::Result<()> {
    init_test_tracing();
    let server = MockServer::start().await;
    let segments = [
        ("/c0ffee/v2/range/prot/v720/0.mp4", "|v0"),
        ("/c0ffee/v2/range/prot/v720/1.mp4", "|v1"),
        ("/c0ffee/v2/range/prot/v720/2.mp4", "|v2"),
        ("/c0ffee/v2/range/prot/a128/0.mp4", "|a0"),
        ("/c0ffee/v2/range/prot/a128/1.mp4", "|a1"),
    ];
    for (segment_path, body) in segments {
        Mock::given(method("GET"))
            .and(path(segment_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let root = tempfile::tempdir()?;
    let work_dir = root.path().join("work");
    let output = root.path().join("video.mp4");

    let client = build_client(DEFAULT_USER_AGENT, HeaderMap::new())?;
    let session = Session::new(
        HttpSegmentFetcher::new(client),
        RecordingMuxer::default(),
        &work_dir,
    );
    let playlist_url = format!("{}/c0ffee/v2/playlist/av/primary/playlist.json", server.uri());
    session.run(&manifest(), &playlist_url, &output).await?;

    assert_eq!(
        tokio::fs::read_to_string(&output).await?,
        "V720INIT|v0|v1|v2A128INIT|a0|a1"
    );
    assert_removed(&work_dir);

    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_download_playlist() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/c0ffee/v2/playlist/av/primary/playlist.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{
                "video": [
                    { "id": "v1", "height": 1080, "init_segment": "VklOSVQ=", "segments": [{ "url": "v1/0.mp4" }] },
                    { "id": "v0", "height": 540, "init_segment": "", "segments": [{ "url": "v0/0.mp4" }] }
                ],
                "audio": [{ "id": "a1", "bitrate": 128000, "init_segment": "QUlOSVQ=", "segments": [{ "url": "a1/0.mp4" }] }]
            }"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c0ffee/v2/range/prot/v1/0.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("|video"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c0ffee/v2/range/prot/a1/0.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("|audio"))
        .mount(&server)
        .await;

    let root = tempfile::tempdir()?;
    // stands in for ffmpeg: concatenates both inputs into the last argument
    let ffmpeg = root.path().join("ffmpeg");
    std::fs::write(
        &ffmpeg,
        "#!/bin/sh\nfor last; do :; done\ncat \"$3\" \"$5\" > \"$last\"\n",
    )?;
    std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755))?;

    let temp_parent = root.path().join("tmp");
    std::fs::create_dir(&temp_parent)?;
    let config = rangedl::SessionConfig {
        temp_dir: Some(temp_parent.clone()),
        ffmpeg: Some(ffmpeg),
        ..Default::default()
    };
    let output = root.path().join("video.mp4");
    let playlist_url = format!("{}/c0ffee/v2/playlist/av/primary/playlist.json", server.uri());

    rangedl::download_playlist(&config, &playlist_url, &output, None).await?;

    assert_eq!(
        tokio::fs::read_to_string(&output).await?,
        "VINIT|videoAINIT|audio"
    );
    // the run directory is removed, the configured parent is kept
    assert!(temp_parent.exists());
    assert_eq!(std::fs::read_dir(&temp_parent)?.count(), 0);

    Ok(())
}
