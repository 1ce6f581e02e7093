//! Page rendering using chromiumoxide.

use chromiumoxide::browser::{Browser as ChromeBrowser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RendererConfig;

/// Scripted step run on a page before its HTML is read
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    /// Scroll to the bottom `passes` times, pausing after each scroll
    ScrollToBottom { passes: u32, pause: Duration },
    /// Click the first element matching `selector`, waiting up to `timeout`
    Click { selector: String, timeout: Duration },
}

/// Rendering failures
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),
    #[error("Failed to load {url}: {message}")]
    Navigation { url: String, message: String },
    #[error("Failed to read content of {url}: {message}")]
    Content { url: String, message: String },
}

/// How a scripted click ended. None of these abort rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ClickOutcome {
    Clicked,
    Failed(String),
    TimedOut,
}

async fn click_within<F, E>(timeout: Duration, click: F) -> ClickOutcome
where
    F: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    match tokio::time::timeout(timeout, click).await {
        Ok(Ok(())) => ClickOutcome::Clicked,
        Ok(Err(e)) => ClickOutcome::Failed(e.to_string()),
        Err(_) => ClickOutcome::TimedOut,
    }
}

/// Anything that can turn a URL into rendered HTML
pub trait PageRenderer {
    async fn render(&self, url: &str, interactions: &[Interaction]) -> Result<String, RenderError>;
}

/// Headless Chrome wrapper
pub struct Browser {
    browser: ChromeBrowser,
    handle: tokio::task::JoinHandle<()>,
    settle: Duration,
}

impl Browser {
    /// Launch a browser instance
    pub async fn launch(config: &RendererConfig) -> Result<Self, RenderError> {
        let chrome_path = match config.chrome_executable.as_deref() {
            Some(path) => path,
            None if cfg!(target_os = "macos") => {
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"
            }
            None if cfg!(target_os = "windows") => {
                "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe"
            }
            None => "google-chrome",
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .no_sandbox()
            .disable_default_args()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--mute-audio")
            .window_size(1280, 1024);
        builder = if config.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let browser_config = builder.build().map_err(RenderError::Launch)?;

        let (browser, mut handler) = ChromeBrowser::launch(browser_config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        // Handler must keep running for the browser to work
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        Ok(Self {
            browser,
            handle,
            settle: Duration::from_millis(config.settle_ms),
        })
    }

    async fn run_interaction(page: &Page, interaction: &Interaction) {
        match interaction {
            Interaction::ScrollToBottom { passes, pause } => {
                for pass in 0..*passes {
                    if let Err(e) = page
                        .evaluate("window.scrollTo(0, document.body.scrollHeight)")
                        .await
                    {
                        warn!("Scroll pass {} failed: {}", pass + 1, e);
                    }
                    tokio::time::sleep(*pause).await;
                }
            }
            Interaction::Click { selector, timeout } => {
                // A missing target degrades to whatever content already loaded
                match click_within(*timeout, Self::click_when_present(page, selector)).await {
                    ClickOutcome::Clicked => debug!("Clicked {}", selector),
                    ClickOutcome::Failed(e) => {
                        warn!("Click on {} failed, continuing: {}", selector, e)
                    }
                    ClickOutcome::TimedOut => warn!(
                        "Click target {} not found within {:?}, continuing",
                        selector, timeout
                    ),
                }
            }
        }
    }

    async fn click_when_present(
        page: &Page,
        selector: &str,
    ) -> Result<(), chromiumoxide::error::CdpError> {
        loop {
            match page.find_element(selector).await {
                Ok(element) => {
                    element.click().await?;
                    return Ok(());
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(250)).await,
            }
        }
    }

    /// Close the browser
    pub async fn close(mut self) {
        let _ = self.browser.close().await;
        self.handle.abort();
    }
}

impl PageRenderer for Browser {
    async fn render(&self, url: &str, interactions: &[Interaction]) -> Result<String, RenderError> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| RenderError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        for interaction in interactions {
            Self::run_interaction(&page, interaction).await;
        }

        tokio::time::sleep(self.settle).await;

        let html = page.content().await.map_err(|e| RenderError::Content {
            url: url.to_string(),
            message: e.to_string(),
        });

        let _ = page.close().await;

        html
    }
}
