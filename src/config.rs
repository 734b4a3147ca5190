//! Client configuration: which operator to talk to and how the manager behaves
//!
//! Settings are read once when an `IdentityManager` is built.

use reqwest::Url;

/// Platform tag reported in the client-version header.
pub const PLATFORM: &str = "rust";

/// Which identity programme the client belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Account {
    Uid2,
    Euid,
}

impl Account {
    /// Name of the header carrying `<platform>-<version>` on every request.
    pub fn client_version_header(self) -> &'static str {
        match self {
            Account::Uid2 => "X-UID2-Client-Version",
            Account::Euid => "X-EUID-Client-Version",
        }
    }
}

/// An operator endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub endpoint: Url,
    pub account: Account,
    pub is_production: bool,
}

impl Environment {
    fn preset(url: &'static str, account: Account, is_production: bool) -> Self {
        // Preset URLs are literals known to parse.
        let endpoint = Url::parse(url).unwrap_or_else(|_| unreachable!("preset url {}", url));
        Self {
            endpoint,
            account,
            is_production,
        }
    }

    /// UID2 production, also served from Ohio.
    pub fn production() -> Self {
        Self::preset("https://prod.uidapi.com", Account::Uid2, true)
    }

    pub fn ohio() -> Self {
        Self::production()
    }

    pub fn oregon() -> Self {
        Self::preset("https://usw.prod.uidapi.com", Account::Uid2, true)
    }

    pub fn singapore() -> Self {
        Self::preset("https://sg.prod.uidapi.com", Account::Uid2, true)
    }

    pub fn sydney() -> Self {
        Self::preset("https://au.prod.uidapi.com", Account::Uid2, true)
    }

    pub fn tokyo() -> Self {
        Self::preset("https://jp.prod.uidapi.com", Account::Uid2, true)
    }

    /// UID2 integration environment for testing against real operators.
    pub fn integration() -> Self {
        Self::preset("https://operator-integ.uidapi.com", Account::Uid2, false)
    }

    pub fn euid_production() -> Self {
        Self::preset("https://prod.euid.eu", Account::Euid, true)
    }

    pub fn euid_london() -> Self {
        Self::euid_production()
    }

    pub fn euid_integration() -> Self {
        Self::preset("https://integ.euid.eu", Account::Euid, false)
    }

    /// A caller-supplied endpoint. Never treated as production.
    pub fn custom(endpoint: Url, account: Account) -> Self {
        Self {
            endpoint,
            account,
            is_production: false,
        }
    }

    /// Resolve a request path against this endpoint, replacing any base path.
    pub fn url_for(&self, path: &str, query: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        url.set_path(path);
        url.set_query(None);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().copied());
        }
        url
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::production()
    }
}

/// Manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub environment: Environment,
    pub automatic_refresh: bool,
    pub logging_enabled: bool,
    pub sdk_version: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            automatic_refresh: true,
            logging_enabled: false,
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Settings {
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_automatic_refresh(mut self, enabled: bool) -> Self {
        self.automatic_refresh = enabled;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    pub fn with_sdk_version(mut self, version: impl Into<String>) -> Self {
        self.sdk_version = version.into();
        self
    }

    /// `(header name, "<platform>-<version>")` sent with every request.
    pub fn client_version_header(&self) -> (&'static str, String) {
        (
            self.environment.account.client_version_header(),
            format!("{}-{}", PLATFORM, self.sdk_version),
        )
    }
}
