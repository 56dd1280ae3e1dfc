use url::Url;

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub api_url: Url,
}

impl GlobalArgs {
    #[must_use]
    pub const fn new(api_url: Url) -> Self {
        Self { api_url }
    }
}
