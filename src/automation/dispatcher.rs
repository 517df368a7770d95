use crate::automation::adapter::{SiteAdapter, GENERIC, REGISTERED_ADAPTERS};

/// Selects the site adapter for a target URL.
///
/// The first registered adapter whose domain fragment occurs in the URL wins;
/// anything else gets the fallback. Never fails.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    adapters: &'static [SiteAdapter],
    fallback: &'static SiteAdapter,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            adapters: REGISTERED_ADAPTERS,
            fallback: &GENERIC,
        }
    }
}

impl Dispatcher {
    pub fn with_adapters(adapters: &'static [SiteAdapter], fallback: &'static SiteAdapter) -> Self {
        Self { adapters, fallback }
    }

    pub fn dispatch(&self, url: &str) -> &'static SiteAdapter {
        self.adapters
            .iter()
            .find(|adapter| adapter.matches(url))
            .unwrap_or(self.fallback)
    }
}

/// Dispatch against the built-in registry.
pub fn dispatch(url: &str) -> &'static SiteAdapter {
    Dispatcher::default().dispatch(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::adapter::{Platform, INDEED, LINKEDIN};

    #[test]
    fn test_linkedin_url() {
        assert_eq!(
            dispatch("https://www.linkedin.com/jobs/view/123").platform,
            Platform::LinkedIn
        );
    }

    #[test]
    fn test_unknown_domain_falls_back_to_generic() {
        let adapter = dispatch("https://boards.example.org/job/9");
        assert_eq!(adapter.platform, Platform::Generic);
        assert!(adapter.requires_manual_review);
    }

    #[test]
    fn test_indeed_and_glassdoor() {
        assert_eq!(
            dispatch("https://www.indeed.com/viewjob?jk=abc").platform,
            Platform::Indeed
        );
        assert_eq!(
            dispatch("https://www.glassdoor.com/job-listing/x").platform,
            Platform::Glassdoor
        );
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert_eq!(
            dispatch("https://WWW.LINKEDIN.COM/jobs/view/1").platform,
            Platform::Generic
        );
    }

    #[test]
    fn test_first_match_wins() {
        // Indeed link carried inside a LinkedIn redirect: LinkedIn is checked first.
        let url = "https://www.linkedin.com/redir?to=https://www.indeed.com/viewjob";
        assert_eq!(dispatch(url).platform, Platform::LinkedIn);
    }

    #[test]
    fn test_custom_registry() {
        static ONLY_INDEED: [SiteAdapter; 1] = [INDEED];
        let dispatcher = Dispatcher::with_adapters(&ONLY_INDEED, &LINKEDIN);
        assert_eq!(dispatcher.dispatch("https://example.com").platform, Platform::LinkedIn);
        assert_eq!(
            dispatcher.dispatch("https://indeed.com/x").platform,
            Platform::Indeed
        );
    }
}
