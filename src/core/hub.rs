//! Model artifact resolution: a local export directory or a hub download

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::core::config::ModelSource;
use crate::core::errors::{Result, TranslationError};

/// Model configuration file name
pub const CONFIG_FILE: &str = "config.json";

/// Tokenizer file name
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// On-disk locations of everything the translator loads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifacts {
    /// `config.json`
    pub config: PathBuf,
    /// `tokenizer.json`
    pub tokenizer: PathBuf,
    /// Encoder graph
    pub encoder: PathBuf,
    /// Decoder graph
    pub decoder: PathBuf,
}

impl ModelArtifacts {
    /// Expected artifact paths inside `dir`
    pub fn in_dir(dir: &Path, source: &ModelSource) -> Self {
        Self {
            config: dir.join(CONFIG_FILE),
            tokenizer: dir.join(TOKENIZER_FILE),
            encoder: dir.join(&source.encoder_file),
            decoder: dir.join(&source.decoder_file),
        }
    }

    /// All four paths, config first
    pub fn paths(&self) -> [&Path; 4] {
        [&self.config, &self.tokenizer, &self.encoder, &self.decoder]
    }

    /// Artifacts not present on disk
    pub fn missing(&self) -> Vec<PathBuf> {
        self.paths()
            .into_iter()
            .filter(|path| !path.is_file())
            .map(Path::to_path_buf)
            .collect()
    }
}

/// Relative names of the artifacts inside a repository snapshot
fn artifact_names(source: &ModelSource) -> [&str; 4] {
    [
        CONFIG_FILE,
        TOKENIZER_FILE,
        source.encoder_file.as_str(),
        source.decoder_file.as_str(),
    ]
}

/// Locate artifacts, downloading them from the hub when no local directory is configured
pub async fn resolve_artifacts(source: &ModelSource, progress: bool) -> Result<ModelArtifacts> {
    match &source.local_dir {
        Some(dir) => {
            let artifacts = ModelArtifacts::in_dir(dir, source);
            let missing = artifacts.missing();
            if !missing.is_empty() {
                return Err(TranslationError::ModelLoad {
                    message: format!(
                        "model directory {} is missing: {}",
                        dir.display(),
                        missing
                            .iter()
                            .map(|p| p.display().to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                });
            }
            info!("Using local model directory {}", dir.display());
            Ok(artifacts)
        }
        None => ModelHub::new(source.clone())?.fetch(progress).await,
    }
}

/// Downloads repository files into a local snapshot cache
#[derive(Debug, Clone)]
pub struct ModelHub {
    client: reqwest::Client,
    source: ModelSource,
}

impl ModelHub {
    /// Client for `source` with connect timeout and user agent set
    pub fn new(source: ModelSource) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, source })
    }

    /// Download URL for a file in the configured repository and revision
    pub fn file_url(&self, file: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.source.hub_endpoint.trim_end_matches('/'),
            self.source.repo_id,
            self.source.revision,
            file
        )
    }

    /// Cache directory holding this repository revision
    pub fn snapshot_dir(&self) -> PathBuf {
        self.source
            .cache_dir
            .join(format!("models--{}", self.source.repo_id.replace('/', "--")))
            .join(&self.source.revision)
    }

    /// Make sure every artifact is cached, downloading the missing ones
    pub async fn fetch(&self, progress: bool) -> Result<ModelArtifacts> {
        let snapshot = self.snapshot_dir();
        info!(
            "Resolving {}@{} into {}",
            self.source.repo_id,
            self.source.revision,
            snapshot.display()
        );

        for name in artifact_names(&self.source) {
            let dest = snapshot.join(name);
            if dest.is_file() {
                debug!("Cached: {}", dest.display());
                continue;
            }
            let url = self.file_url(name);
            let bytes = self.download(&url, &dest, progress).await?;
            info!("Downloaded {} ({} bytes)", name, bytes);
        }

        Ok(ModelArtifacts::in_dir(&snapshot, &self.source))
    }

    /// Stream `url` into `dest` through a `.part` file
    async fn download(&self, url: &str, dest: &Path, progress: bool) -> Result<u64> {
        let download_error = |message: String| TranslationError::Download {
            url: url.to_string(),
            message,
        };

        let mut request = self.client.get(url);
        if let Some(token) = &self.source.hub_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| download_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(download_error(format!("HTTP {}", status)));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bar = progress.then(|| progress_bar(response.content_length(), dest));
        let saved = save_stream(response.bytes_stream(), dest, bar.as_ref(), &download_error).await;
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        saved
    }
}

/// Write a body to `dest` through its `.part` file, removing the partial
/// file when the transfer fails
async fn save_stream<S, B, E>(
    body: S,
    dest: &Path,
    bar: Option<&ProgressBar>,
    download_error: &impl Fn(String) -> TranslationError,
) -> Result<u64>
where
    S: futures_util::Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let partial = partial_path(dest);
    match write_stream(body, &partial, bar, download_error).await {
        Ok(downloaded) => {
            tokio::fs::rename(&partial, dest).await?;
            Ok(downloaded)
        }
        Err(e) => {
            if let Err(remove_error) = tokio::fs::remove_file(&partial).await {
                debug!("Could not remove {}: {}", partial.display(), remove_error);
            }
            Err(e)
        }
    }
}

async fn write_stream<S, B, E>(
    body: S,
    path: &Path,
    bar: Option<&ProgressBar>,
    download_error: &impl Fn(String) -> TranslationError,
) -> Result<u64>
where
    S: futures_util::Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut file = tokio::fs::File::create(path).await?;
    let mut downloaded: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| download_error(e.to_string()))?;
        let chunk = chunk.as_ref();
        file.write_all(chunk).await?;
        downloaded += chunk.len() as u64;
        if let Some(bar) = bar {
            bar.set_position(downloaded);
        }
    }

    file.flush().await?;
    Ok(downloaded)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn progress_bar(total: Option<u64>, dest: &Path) -> ProgressBar {
    let bar = match total {
        Some(total) => {
            let bar = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            {
                bar.set_style(style.progress_chars("=>-"));
            }
            bar
        }
        None => ProgressBar::new_spinner(),
    };

    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    bar.set_message(name);
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path as UrlPath, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeHub {
        hits: AtomicUsize,
        auth: Mutex<Vec<String>>,
    }

    async fn serve_file(
        State(hub): State<Arc<FakeHub>>,
        UrlPath(path): UrlPath<String>,
        headers: HeaderMap,
    ) -> (StatusCode, String) {
        hub.hits.fetch_add(1, Ordering::SeqCst);
        if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            hub.auth.lock().unwrap().push(value.to_string());
        }
        if path.contains("missing") {
            return (StatusCode::NOT_FOUND, "Entry not found".to_string());
        }
        (StatusCode::OK, format!("contents of {}", path))
    }

    async fn spawn_fake_hub() -> (String, Arc<FakeHub>) {
        let hub = Arc::new(FakeHub::default());
        let app = Router::new()
            .route("/*path", get(serve_file))
            .with_state(hub.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), hub)
    }

    fn source(endpoint: &str, cache_dir: &Path) -> ModelSource {
        ModelSource {
            repo_id: "acme/bart-creole".to_string(),
            hub_endpoint: endpoint.to_string(),
            cache_dir: cache_dir.to_path_buf(),
            encoder_file: "onnx/encoder_model.onnx".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_file_url_and_snapshot_dir() {
        let hub = ModelHub::new(source("https://huggingface.co/", Path::new("/cache"))).unwrap();
        assert_eq!(
            hub.file_url("tokenizer.json"),
            "https://huggingface.co/acme/bart-creole/resolve/main/tokenizer.json"
        );
        assert_eq!(
            hub.snapshot_dir(),
            PathBuf::from("/cache/models--acme--bart-creole/main")
        );
    }

    #[test]
    fn test_artifacts_in_dir_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let source = source("https://huggingface.co", dir.path());
        let artifacts = ModelArtifacts::in_dir(dir.path(), &source);
        assert_eq!(artifacts.encoder, dir.path().join("onnx/encoder_model.onnx"));
        assert_eq!(artifacts.missing().len(), 4);

        std::fs::write(&artifacts.config, "{}").unwrap();
        std::fs::write(&artifacts.tokenizer, "{}").unwrap();
        assert_eq!(artifacts.missing(), vec![artifacts.encoder.clone(), artifacts.decoder.clone()]);
    }

    #[test]
    fn test_partial_path_keeps_extension() {
        assert_eq!(
            partial_path(Path::new("/tmp/decoder_model.onnx")),
            PathBuf::from("/tmp/decoder_model.onnx.part")
        );
    }

    #[tokio::test]
    async fn test_interrupted_stream_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("decoder_model.onnx");
        let body = futures_util::stream::iter(vec![
            Ok::<_, String>(b"first chunk".to_vec()),
            Err("connection reset".to_string()),
        ]);
        let to_error = |message: String| TranslationError::Download {
            url: "http://hub/decoder_model.onnx".to_string(),
            message,
        };

        let err = save_stream(body, &dest, None, &to_error).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_completed_stream_is_renamed_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("config.json");
        let body = futures_util::stream::iter(vec![
            Ok::<_, String>(b"{\"bos_token_id\"".to_vec()),
            Ok(b": 0}".to_vec()),
        ]);
        let to_error = |message: String| TranslationError::Download {
            url: "http://hub/config.json".to_string(),
            message,
        };

        let written = save_stream(body, &dest, None, &to_error).await.unwrap();
        assert_eq!(written, 19);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "{\"bos_token_id\": 0}");
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_local_dir_with_missing_files_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = source("https://huggingface.co", dir.path());
        source.local_dir = Some(dir.path().to_path_buf());

        let err = resolve_artifacts(&source, false).await.unwrap_err();
        assert!(matches!(err, TranslationError::ModelLoad { .. }));
        assert!(err.to_string().contains("config.json"));
    }

    #[tokio::test]
    async fn test_fetch_downloads_then_reuses_cache() {
        let (endpoint, fake) = spawn_fake_hub().await;
        let cache = tempfile::tempdir().unwrap();
        let mut source = source(&endpoint, cache.path());
        source.hub_token = Some("hf_secret".to_string());

        let hub = ModelHub::new(source).unwrap();
        let artifacts = hub.fetch(false).await.unwrap();

        assert!(artifacts.missing().is_empty());
        assert_eq!(
            std::fs::read_to_string(&artifacts.encoder).unwrap(),
            "contents of acme/bart-creole/resolve/main/onnx/encoder_model.onnx"
        );
        assert_eq!(fake.hits.load(Ordering::SeqCst), 4);
        assert!(fake
            .auth
            .lock()
            .unwrap()
            .iter()
            .all(|value| value == "Bearer hf_secret"));

        let again = hub.fetch(false).await.unwrap();
        assert_eq!(again, artifacts);
        assert_eq!(fake.hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fetch_reports_http_errors() {
        let (endpoint, _fake) = spawn_fake_hub().await;
        let cache = tempfile::tempdir().unwrap();
        let mut source = source(&endpoint, cache.path());
        source.decoder_file = "missing_decoder.onnx".to_string();

        let err = ModelHub::new(source).unwrap().fetch(false).await.unwrap_err();
        match err {
            TranslationError::Download { url, message } => {
                assert!(url.ends_with("/missing_decoder.onnx"));
                assert!(message.contains("404"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
