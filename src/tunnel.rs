//! A public ngrok tunnel in front of the local server, for sharing the demo.
//!
//! The tunnel is an `ngrok http <port>` child process. Its public URL is read
//! from ngrok's local inspection API, and the process is terminated when the
//! [`Tunnel`] is dropped.

use crate::config::TunnelSettings;
use anyhow::{anyhow, bail, Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Deserialize;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the inspection API is polled while ngrok starts
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct TunnelList {
    tunnels: Vec<TunnelInfo>,
}

#[derive(Debug, Deserialize)]
struct TunnelInfo {
    public_url: String,
    #[serde(default)]
    proto: String,
}

/// Prefer the https endpoint when ngrok reports several
fn pick_public_url(list: TunnelList) -> Option<String> {
    let mut tunnels = list.tunnels;
    tunnels.sort_by_key(|t| t.proto != "https");
    tunnels.into_iter().next().map(|t| t.public_url)
}

/// A handle to a running ngrok process
#[derive(Debug)]
pub struct Tunnel {
    child: Child,
    public_url: String,
}

impl Tunnel {
    /// Start ngrok for `port` and wait until it reports a public URL. ngrok
    /// reads its auth token from `NGROK_AUTHTOKEN` or its own config file.
    pub async fn open(settings: &TunnelSettings, port: u16) -> Result<Self> {
        if std::env::var_os("NGROK_AUTHTOKEN").is_none() {
            warn!("NGROK_AUTHTOKEN is not set; relying on ngrok's own configuration");
        }

        let child = Command::new(&settings.binary)
            .args(["http", &port.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start `{}`", settings.binary))?;

        info!("started ngrok for port {port} (pid = {})", child.id());

        let mut tunnel = Tunnel {
            child,
            public_url: String::new(),
        };
        let timeout = Duration::from_secs(settings.startup_timeout_secs);
        tunnel.public_url = tunnel.wait_for_public_url(&settings.api_url, timeout).await?;

        info!("public URL: {}", tunnel.public_url);
        Ok(tunnel)
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    async fn wait_for_public_url(&mut self, api_url: &str, timeout: Duration) -> Result<String> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(status) = self.child.try_wait()? {
                bail!("ngrok exited before opening a tunnel ({status})");
            }

            match query_public_url(&client, api_url).await {
                Ok(Some(url)) => return Ok(url),
                Ok(None) => debug!("ngrok has no tunnels yet"),
                Err(e) => debug!("ngrok API not ready: {e:#}"),
            }

            if Instant::now() >= deadline {
                return Err(anyhow!(
                    "ngrok did not report a public URL within {timeout:?}"
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Stop the ngrok process
    fn close(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }

        let pid = Pid::from_raw(self.child.id() as i32);
        match kill(pid, Signal::SIGTERM) {
            Ok(()) => {
                let _ = self.child.wait();
                info!("stopped ngrok (pid = {pid})");
            }
            Err(e) => warn!("failed to stop ngrok (pid = {pid}): {e}"),
        }
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn query_public_url(client: &reqwest::Client, api_url: &str) -> Result<Option<String>> {
    let list: TunnelList = client
        .get(api_url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(pick_public_url(list))
}
