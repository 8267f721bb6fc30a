use crate::fetch::error::FetchError;
use futures_util::TryStreamExt;
use log::{debug, info};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, Url};
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Earthdata login credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.trim().is_empty() || self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Moves the bytes behind a URL into a local file.
///
/// Implementations must either leave a complete file at `destination` or
/// return an error; a partially written file may remain at
/// [`part_path`]`(destination)` and is cleaned up by the caller.
pub trait Transport: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        destination: &Path,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;
}

/// Temporary path a download streams into before it is renamed into place.
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Host of the Earthdata login service the data servers redirect to.
pub const EARTHDATA_LOGIN_HOST: &str = "urs.earthdata.nasa.gov";

const MAX_REDIRECTS: usize = 10;

/// Authenticated HTTPS transport. One client (and its cookie jar) is shared
/// by every download of a run, so the login handshake happens once.
///
/// Redirects are followed by hand: reqwest drops `Authorization` on
/// cross-host hops. Credentials only go to the login host, and the data
/// server accepts the session cookie it sets afterwards.
pub struct HttpTransport {
    client: Client,
    credentials: Credentials,
    login_host: String,
}

impl HttpTransport {
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self {
            client,
            credentials,
            login_host: EARTHDATA_LOGIN_HOST.to_string(),
        })
    }

    /// Sends credentials to `host` instead of the Earthdata login service.
    pub fn with_login_host(mut self, host: impl Into<String>) -> Self {
        self.login_host = host.into();
        self
    }

    /// GETs `url`, following redirects and authenticating against the login host.
    async fn get_following_redirects(&self, url: &str) -> Result<Response, FetchError> {
        let mut current = Url::parse(url).map_err(|e| FetchError::Redirect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        for _ in 0..=MAX_REDIRECTS {
            let mut request = self.client.get(current.clone());
            if current.host_str() == Some(self.login_host.as_str()) {
                request = request.basic_auth(&self.credentials.username, Some(&self.credentials.password));
            }
            let response = request
                .send()
                .await
                .map_err(|e| FetchError::NetworkRequest(url.to_string(), e))?;
            if !response.status().is_redirection() {
                return Ok(response);
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| FetchError::Redirect {
                    url: current.to_string(),
                    reason: "redirect without a Location header".to_string(),
                })?;
            let next = current.join(location).map_err(|e| FetchError::Redirect {
                url: current.to_string(),
                reason: e.to_string(),
            })?;
            debug!("{} redirected to {}", current, next);
            current = next;
        }

        Err(FetchError::Redirect {
            url: url.to_string(),
            reason: format!("more than {} redirects", MAX_REDIRECTS),
        })
    }
}

impl Transport for HttpTransport {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
        info!("Downloading {}", url);

        let response = self.get_following_redirects(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(url, status.as_u16()));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::Io(parent.to_path_buf(), e))?;
        }

        let part = part_path(destination);
        let stream = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        let mut reader = StreamReader::new(stream);
        let mut file = tokio::fs::File::create(&part)
            .await
            .map_err(|e| FetchError::Io(part.clone(), e))?;
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| FetchError::Io(part.clone(), e))?;
        file.flush()
            .await
            .map_err(|e| FetchError::Io(part.clone(), e))?;
        file.sync_all()
            .await
            .map_err(|e| FetchError::Io(part.clone(), e))?;
        drop(file);

        tokio::fs::rename(&part, destination)
            .await
            .map_err(|e| FetchError::Io(destination.to_path_buf(), e))?;
        debug!("Wrote {} bytes to {}", written, destination.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, Clone)]
    struct Seen {
        path: String,
        authorization: Option<String>,
        cookie: Option<String>,
    }

    async fn read_request(stream: &mut TcpStream) -> Seen {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let text = String::from_utf8_lossy(&buf).into_owned();
        let header = |name: &str| {
            text.lines().find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.eq_ignore_ascii_case(name).then(|| value.trim().to_string())
            })
        };
        Seen {
            path: text
                .lines()
                .next()
                .and_then(|l| l.split(' ').nth(1))
                .unwrap_or_default()
                .to_string(),
            authorization: header("authorization"),
            cookie: header("cookie"),
        }
    }

    /// Answers every connection with `respond` and records what it saw.
    fn serve<F>(listener: TcpListener, respond: F) -> Arc<Mutex<Vec<Seen>>>
    where
        F: Fn(&Seen) -> String + Send + 'static,
    {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let request = read_request(&mut stream).await;
                let response = respond(&request);
                log.lock().unwrap().push(request);
                stream.write_all(response.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
        });
        seen
    }

    fn redirect(location: &str, set_cookie: Option<&str>) -> String {
        let cookie = set_cookie
            .map(|c| format!("Set-Cookie: {}\r\n", c))
            .unwrap_or_default();
        format!(
            "HTTP/1.1 302 Found\r\nLocation: {}\r\n{}Content-Length: 0\r\nConnection: close\r\n\r\n",
            location, cookie
        )
    }

    fn status(code: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            code,
            body.len(),
            body
        )
    }

    /// A data server on `localhost` that sends anonymous clients to a login
    /// server on `127.0.0.1`, which hands out a session through a callback.
    async fn earthdata_like() -> (u16, Arc<Mutex<Vec<Seen>>>, Arc<Mutex<Vec<Seen>>>) {
        let data_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let login_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let data_port = data_listener.local_addr().unwrap().port();
        let login_port = login_listener.local_addr().unwrap().port();

        let data = serve(data_listener, move |req| {
            if let Some(next) = req.path.strip_prefix("/callback?next=") {
                redirect(next, Some("session=granted; Path=/"))
            } else if req.cookie.as_deref().is_some_and(|c| c.contains("session=granted")) {
                status("200 OK", "granule bytes")
            } else {
                redirect(
                    &format!("http://127.0.0.1:{}/oauth?next={}", login_port, req.path),
                    None,
                )
            }
        });
        let login = serve(login_listener, move |req| {
            match (req.authorization.as_deref(), req.path.strip_prefix("/oauth?next=")) {
                (Some("Basic dXNlcjpzZWNyZXQ="), Some(next)) => redirect(
                    &format!("http://localhost:{}/callback?next={}", data_port, next),
                    None,
                ),
                _ => status("401 Unauthorized", ""),
            }
        });
        (data_port, data, login)
    }

    #[tokio::test]
    async fn logs_in_through_redirects_and_reuses_the_session() {
        let (port, data, login) = earthdata_like().await;
        let dir = tempfile::tempdir().unwrap();
        let transport = HttpTransport::new(Credentials::new("user", "secret"), Duration::from_secs(10))
            .unwrap()
            .with_login_host("127.0.0.1");

        for name in ["a.nc", "b.nc"] {
            let destination = dir.path().join(name);
            transport
                .fetch(&format!("http://localhost:{}/{}", port, name), &destination)
                .await
                .unwrap();
            assert_eq!(std::fs::read_to_string(&destination).unwrap(), "granule bytes");
            assert!(!part_path(&destination).exists());
        }

        let login = login.lock().unwrap();
        assert_eq!(login.len(), 1);
        assert!(login[0].authorization.is_some());
        let data = data.lock().unwrap();
        assert!(data.iter().all(|r| r.authorization.is_none()));
        assert_eq!(data.last().unwrap().path, "/b.nc");
    }

    #[tokio::test]
    async fn refused_login_is_unauthorized() {
        let (port, data, _login) = earthdata_like().await;
        let dir = tempfile::tempdir().unwrap();
        let transport = HttpTransport::new(Credentials::new("user", "wrong"), Duration::from_secs(10))
            .unwrap()
            .with_login_host("127.0.0.1");

        let err = transport
            .fetch(&format!("http://localhost:{}/a.nc", port), &dir.path().join("a.nc"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::fetch::error::FailureKind::Unauthorized);
        assert!(data.lock().unwrap().iter().all(|r| r.authorization.is_none()));
        assert!(!dir.path().join("a.nc").exists());
    }

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/tmp/MERRA2_400.tavg1_2d_rad_Nx.20151101.nc4.nc")),
            PathBuf::from("/tmp/MERRA2_400.tavg1_2d_rad_Nx.20151101.nc4.nc.part")
        );
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("user", "hunter2");
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("hunter2"));
        assert!(Credentials::new(" ", "x").is_empty());
        assert!(!creds.is_empty());
    }
}
