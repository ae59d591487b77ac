//! Pass-through provider for links that already point at a media file

use super::ProviderStrategy;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::types::StreamDescriptor;
use crate::utils::title_from_url;
use async_trait::async_trait;

/// Accepts http(s) URLs whose path ends in a known media extension
#[derive(Clone, Debug)]
pub struct DirectLinkProvider {
    extensions: Vec<String>,
}

impl DirectLinkProvider {
    /// Create a provider recognising the given extensions (without dots)
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }
}

#[async_trait]
impl ProviderStrategy for DirectLinkProvider {
    fn name(&self) -> &str {
        "direct-link"
    }

    async fn resolve(&self, source: &str) -> Result<StreamDescriptor, ProviderError> {
        let unsupported = || ProviderError::new(self.name(), ProviderErrorKind::Unsupported);

        let url = url::Url::parse(source).map_err(|_| unsupported())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(unsupported());
        }

        let mut descriptor = StreamDescriptor::new(source, title_from_url(source));
        let extension = descriptor.container_extension().ok_or_else(unsupported)?;
        if !self
            .extensions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(&extension))
        {
            return Err(unsupported());
        }

        descriptor.extension = Some(extension);
        Ok(descriptor)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> DirectLinkProvider {
        DirectLinkProvider::new(vec!["mp3".into(), "m4a".into()])
    }

    #[tokio::test]
    async fn media_link_passes_through_unchanged() {
        let source = "https://cdn.example/music/Intro.MP3?token=abc";
        let descriptor = provider().resolve(source).await.unwrap();

        assert_eq!(descriptor.url, source);
        assert_eq!(descriptor.extension.as_deref(), Some("mp3"));
        assert_eq!(descriptor.title, "Intro");
        assert!(descriptor.headers.is_empty());
    }

    #[tokio::test]
    async fn page_links_are_unsupported() {
        let err = provider()
            .resolve("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .await
            .unwrap_err();
        assert_eq!(err.provider, "direct-link");
        assert!(matches!(err.kind, ProviderErrorKind::Unsupported));
    }

    #[tokio::test]
    async fn unknown_extension_and_non_http_are_unsupported() {
        assert!(provider().resolve("https://cdn.example/file.zip").await.is_err());
        assert!(provider().resolve("ftp://cdn.example/file.mp3").await.is_err());
    }
}
