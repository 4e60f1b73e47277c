use crate::domain::error::{AppError, Result};
use crate::infrastructure::html::{render_page, PageLink};
use crate::infrastructure::storage::ensure_dir;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait PageFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String>;
}

pub type SharedPageFetcher = Arc<dyn PageFetcher + Send + Sync>;

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_timeout(30).unwrap_or_else(|_| Self {
            client: Client::new(),
        })
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("Mozilla/5.0 (compatible; agent-tasks/0.1)")
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to fetch URL: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP error {}: {}",
                response.status(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {}", e)))
    }
}

/// Which links a crawl may follow.
#[derive(Debug, Clone)]
pub struct LinkPolicy {
    base_url: String,
    denied_paths: Vec<String>,
}

impl LinkPolicy {
    pub fn new(base_url: &str, denied_paths: &[&str]) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            denied_paths: denied_paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `href`, or `None` when the link leaves the site or is denied.
    pub fn resolve(&self, href: &str, current_url: &str) -> Option<String> {
        let href = href.trim();

        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
        {
            return None;
        }
        if self.denied_paths.iter().any(|denied| href.contains(denied)) {
            return None;
        }

        if href.starts_with("http://") || href.starts_with("https://") {
            if href.contains(&self.base_url) {
                Some(href.trim_end_matches('/').to_string())
            } else {
                None
            }
        } else if href.starts_with('/') {
            Some(format!("{}{}", self.base_url, href.trim_end_matches('/')))
        } else {
            let current = url::Url::parse(current_url).ok()?;
            let joined = current.join(href).ok()?;
            let joined = joined.to_string();
            joined.starts_with(&self.base_url).then_some(joined)
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub url: String,
    pub file: PathBuf,
    pub markdown: String,
    pub links: Vec<PageLink>,
}

/// Depth-first crawl that saves every page as markdown, one file per page.
pub struct WebCrawler {
    fetcher: SharedPageFetcher,
    policy: LinkPolicy,
    output_dir: PathBuf,
    max_pages: usize,
}

impl WebCrawler {
    pub fn new(fetcher: SharedPageFetcher, policy: LinkPolicy, output_dir: PathBuf) -> Self {
        Self {
            fetcher,
            policy,
            output_dir,
            max_pages: 200,
        }
    }

    pub async fn crawl_site(&self) -> Result<Vec<CrawledPage>> {
        ensure_dir(&self.output_dir).await?;

        let start_url = self.policy.base_url().to_string();
        let mut visited = HashSet::new();
        let mut results = Vec::new();
        let mut stack: Vec<(String, Option<String>)> = vec![(start_url.clone(), None)];

        info!(url = %start_url, "Starting crawl");

        while let Some((url, title)) = stack.pop() {
            if results.len() >= self.max_pages {
                warn!(max_pages = self.max_pages, "Crawl page limit reached");
                break;
            }
            if !visited.insert(url.clone()) {
                continue;
            }

            let page = self
                .crawl_page(&url, title.as_deref())
                .await
                .inspect_err(|e| warn!(url = %url, error = %e, "Failed to crawl"))?;
            info!(
                url = %url,
                chars = page.markdown.len(),
                links = page.links.len(),
                "Crawled"
            );

            let next: Vec<_> = page
                .links
                .iter()
                .filter_map(|link| {
                    self.policy
                        .resolve(&link.href, &url)
                        .map(|resolved| (resolved, Some(link.title.clone())))
                })
                .filter(|(resolved, _)| !visited.contains(resolved))
                .collect();
            stack.extend(next.into_iter().rev());

            results.push(page);
        }

        info!(pages = results.len(), "Crawl complete");
        Ok(results)
    }

    async fn crawl_page(&self, url: &str, title: Option<&str>) -> Result<CrawledPage> {
        let html = self.fetcher.fetch_html(url).await?;
        let page = render_page(&html);

        let file = self
            .output_dir
            .join(format!("{}.md", page_file_stem(title, url)));
        tokio::fs::write(&file, format!("SOURCE: {}\n\n{}", url, page.markdown)).await?;

        Ok(CrawledPage {
            url: url.to_string(),
            file,
            markdown: page.markdown,
            links: page.links,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Lowercased link title with spaces turned into dashes; `main-page` for the start page.
pub fn page_file_stem(title: Option<&str>, url: &str) -> String {
    let slug = |value: &str| {
        value
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .replace(['/', '\\'], "-")
    };

    match title.map(slug).filter(|s| !s.is_empty()) {
        Some(stem) => stem,
        None => {
            let path = url::Url::parse(url)
                .map(|u| u.path().trim_matches('/').to_string())
                .unwrap_or_default();
            if path.is_empty() {
                "main-page".to_string()
            } else {
                slug(&path)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned HTML and records every requested URL.
    pub struct StaticSite {
        pages: HashMap<String, String>,
        pub requests: Mutex<Vec<String>>,
    }

    impl StaticSite {
        pub fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, html)| (url.to_string(), html.to_string()))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for StaticSite {
        async fn fetch_html(&self, url: &str) -> Result<String> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::HttpError(format!("HTTP error 404 Not Found: {}", url)))
        }
    }
}
