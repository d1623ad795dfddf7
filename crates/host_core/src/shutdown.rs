// Tandem host core - Shutdown coordination
// Best-effort `/quit` to the backend, then make sure it is gone

use crate::backend::{BackendExit, BackendProcess};
use crate::error::{CoreError, QuitError, QuitErrorKind};
use crate::port::Port;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What asked the host to shut down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownSource {
    Ui,
    WindowsClosed,
    Signal(String),
    /// A supervised child process exited on its own.
    ChildExited(String),
    Fault(String),
}

impl fmt::Display for ShutdownSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ui => f.write_str("ui quit"),
            Self::WindowsClosed => f.write_str("all windows closed"),
            Self::Signal(name) => write!(f, "signal {name}"),
            Self::ChildExited(child) => write!(f, "child exit: {child}"),
            Self::Fault(message) => write!(f, "fault: {message}"),
        }
    }
}

/// HTTP client for the backend's `/quit` route.
#[derive(Clone, Debug)]
pub struct QuitClient {
    client: reqwest::Client,
    url: String,
}

impl QuitClient {
    pub fn new(port: Port, timeout: Duration) -> Result<Self, CoreError> {
        Self::for_url(format!("http://127.0.0.1:{port}/quit"), timeout)
    }

    pub fn for_url(url: impl Into<String>, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CoreError::HttpClient)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn request_quit(&self) -> Result<(), QuitError> {
        let to_quit_error = |e: reqwest::Error| QuitError {
            kind: classify(&e),
            message: e.to_string(),
        };
        self.client
            .get(&self.url)
            .send()
            .await
            .map_err(to_quit_error)?
            .error_for_status()
            .map_err(to_quit_error)?;
        Ok(())
    }
}

/// Map a request failure onto [`QuitErrorKind`] by walking its source chain.
pub fn classify(err: &reqwest::Error) -> QuitErrorKind {
    if err.is_timeout() {
        return QuitErrorKind::Timeout;
    }
    if let Some(status) = err.status() {
        return QuitErrorKind::Status(status.as_u16());
    }

    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io_err) = inner.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => return QuitErrorKind::ConnectionRefused,
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe => return QuitErrorKind::ConnectionReset,
                io::ErrorKind::TimedOut => return QuitErrorKind::Timeout,
                _ => {}
            }
        }
        source = inner.source();
    }
    QuitErrorKind::Other
}

#[derive(Debug)]
pub enum QuitOutcome {
    Acknowledged,
    /// Refused or reset: the backend is already gone or closing.
    BackendGone(QuitErrorKind),
    Failed(QuitError),
}

impl QuitOutcome {
    fn from_result(result: Result<(), QuitError>) -> Self {
        match result {
            Ok(()) => Self::Acknowledged,
            Err(e) if e.kind.is_expected() => Self::BackendGone(e.kind),
            Err(e) => Self::Failed(e),
        }
    }

    /// Only unexpected failures are worth a log line.
    pub fn is_logged(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug)]
pub struct ShutdownReport {
    pub source: ShutdownSource,
    pub quit: QuitOutcome,
    pub backend: BackendExit,
}

/// One-shot shutdown of the backend. Never fails; the caller exits the host
/// once it returns.
pub struct ShutdownCoordinator {
    quit: QuitClient,
    backend: Arc<BackendProcess>,
    exit_grace: Duration,
    started: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(quit: QuitClient, backend: Arc<BackendProcess>, exit_grace: Duration) -> Self {
        Self {
            quit,
            backend,
            exit_grace,
            started: AtomicBool::new(false),
        }
    }

    /// Claim the shutdown. False if another request got there first.
    pub fn begin(&self, source: &ShutdownSource) -> bool {
        let claimed = self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if claimed {
            tracing::info!(%source, "shutting down");
        } else {
            tracing::debug!(%source, "shutdown already in progress");
        }
        claimed
    }

    pub fn is_in_flight(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Ask the backend to quit. Refused/reset are silent.
    pub async fn notify_backend(&self) -> QuitOutcome {
        let outcome = QuitOutcome::from_result(self.quit.request_quit().await);
        if outcome.is_logged() {
            tracing::warn!(url = self.quit.url(), ?outcome, "backend quit request failed");
        } else if let QuitOutcome::Acknowledged = outcome {
            tracing::debug!(url = self.quit.url(), "backend acknowledged quit");
        }
        outcome
    }

    /// Run the whole shutdown once. `None` when already in flight.
    pub async fn shutdown(&self, source: ShutdownSource) -> Option<ShutdownReport> {
        if !self.begin(&source) {
            return None;
        }
        Some(self.run(source).await)
    }

    /// Shutdown body for a caller that already won [`Self::begin`].
    pub async fn run(&self, source: ShutdownSource) -> ShutdownReport {
        let quit = self.notify_backend().await;
        let backend = self.backend.reap(self.exit_grace).await;
        ShutdownReport {
            source,
            quit,
            backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Formatted log output of the current thread, for asserting what a
    /// shutdown actually wrote.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::DEBUG)
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn lines_at(&self, level: &str) -> Vec<String> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .filter(|line| line.split_whitespace().any(|word| word == level))
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let url = format!("http://{}/quit", listener.local_addr().unwrap());
        (listener, url)
    }

    /// Serve one request with a canned status line.
    async fn respond_once(status: &'static str) -> String {
        let (listener, url) = listener().await;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response =
                format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            stream.write_all(response.as_bytes()).await.unwrap();
        });
        url
    }

    fn coordinator(url: &str, timeout: Duration) -> ShutdownCoordinator {
        ShutdownCoordinator::new(
            QuitClient::for_url(url, timeout).unwrap(),
            Arc::new(BackendProcess::new()),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn acknowledged_quit() {
        let url = respond_once("200 OK").await;
        let outcome = coordinator(&url, TIMEOUT).notify_backend().await;
        assert!(matches!(outcome, QuitOutcome::Acknowledged));
        assert!(!outcome.is_logged());
    }

    #[tokio::test]
    async fn refused_connection_is_silent() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();
        let (listener, url) = listener().await;
        drop(listener);

        let outcome = coordinator(&url, TIMEOUT).notify_backend().await;
        assert!(matches!(
            outcome,
            QuitOutcome::BackendGone(QuitErrorKind::ConnectionRefused)
        ));
        assert!(!outcome.is_logged());
        assert!(logs.lines_at("WARN").is_empty());
        assert!(logs.lines_at("ERROR").is_empty());
    }

    #[tokio::test]
    async fn reset_connection_is_silent() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();
        let (listener, url) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // Closing with the request still unread makes the kernel send RST.
            stream.readable().await.unwrap();
            drop(stream);
        });

        let report = coordinator(&url, TIMEOUT)
            .shutdown(ShutdownSource::Signal("SIGTERM".to_string()))
            .await
            .unwrap();
        assert!(matches!(
            report.quit,
            QuitOutcome::BackendGone(QuitErrorKind::ConnectionReset)
        ));
        assert!(!report.quit.is_logged());
        assert!(logs.lines_at("WARN").is_empty());
        assert!(logs.lines_at("ERROR").is_empty());
    }

    #[tokio::test]
    async fn server_error_is_logged_but_shutdown_completes() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();
        let url = respond_once("500 Internal Server Error").await;

        let report = coordinator(&url, TIMEOUT)
            .shutdown(ShutdownSource::Ui)
            .await
            .unwrap();

        match &report.quit {
            QuitOutcome::Failed(e) => assert_eq!(e.kind, QuitErrorKind::Status(500)),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(report.quit.is_logged());
        assert_eq!(report.backend, BackendExit::NotRunning);
        let warnings = logs.lines_at("WARN");
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        assert!(warnings[0].contains("backend quit request failed"));
        assert!(warnings[0].contains("500"));
    }

    #[tokio::test]
    async fn hung_backend_is_bounded_by_timeout() {
        let (listener, url) = listener().await;
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let report = coordinator(&url, Duration::from_millis(200))
            .shutdown(ShutdownSource::WindowsClosed)
            .await
            .unwrap();
        match &report.quit {
            QuitOutcome::Failed(e) => assert_eq!(e.kind, QuitErrorKind::Timeout),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_request_is_a_no_op() {
        let (listener, url) = listener().await;
        drop(listener);
        let coordinator = coordinator(&url, TIMEOUT);

        let first = coordinator.shutdown(ShutdownSource::Ui).await;
        let second = coordinator
            .shutdown(ShutdownSource::Fault("panic".to_string()))
            .await;

        assert_eq!(first.unwrap().source, ShutdownSource::Ui);
        assert!(second.is_none());
        assert!(coordinator.is_in_flight());
    }

    #[test]
    fn child_exit_is_not_a_signal() {
        let source = ShutdownSource::ChildExited("desktop host, exit status: 1".to_string());
        assert_eq!(source.to_string(), "child exit: desktop host, exit status: 1");
        assert_ne!(source, ShutdownSource::Signal("exit".to_string()));
    }

    #[test]
    fn expected_kinds() {
        assert!(QuitErrorKind::ConnectionRefused.is_expected());
        assert!(QuitErrorKind::ConnectionReset.is_expected());
        assert!(!QuitErrorKind::Timeout.is_expected());
        assert!(!QuitErrorKind::Status(500).is_expected());
        assert!(!QuitErrorKind::Other.is_expected());
    }
}
