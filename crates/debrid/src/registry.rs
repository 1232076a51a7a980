//! Which providers exist, and one ready-to-use instance of each.

use crate::error::{ErrorKind, Result};
use crate::http::HttpClient;
use crate::provider::{AllDebrid, OneFichier, Premiumize, ProviderHandle, TorBox};
use debrix_config::Settings;
use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    AllDebrid,
    TorBox,
    Premiumize,
    OneFichier,
}
impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [Self::AllDebrid, Self::TorBox, Self::Premiumize, Self::OneFichier];

    /// Name used in user configuration and resolve links.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllDebrid => "alldebrid",
            Self::TorBox => "torbox",
            Self::Premiumize => "premiumize",
            Self::OneFichier => "1fichier",
        }
    }

    /// Short tag shown in stream names.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::AllDebrid => "AD",
            Self::TorBox => "TB",
            Self::Premiumize => "PM",
            Self::OneFichier => "1F",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::AllDebrid => "AllDebrid",
            Self::TorBox => "TorBox",
            Self::Premiumize => "Premiumize",
            Self::OneFichier => "1fichier",
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = crate::Error;

    /// Accepts configuration names and tags, in any case.
    ///
    /// # Examples
    ///
    /// ```
    /// use debrix_debrid::ProviderKind;
    /// assert_eq!("TorBox".parse::<ProviderKind>().unwrap(), ProviderKind::TorBox);
    /// assert_eq!("ad".parse::<ProviderKind>().unwrap(), ProviderKind::AllDebrid);
    /// assert!("realdebrid".parse::<ProviderKind>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| {
                wanted.eq_ignore_ascii_case(kind.as_str())
                    || wanted.eq_ignore_ascii_case(kind.tag())
                    || (*kind == Self::OneFichier && wanted.eq_ignore_ascii_case("onefichier"))
            })
            .ok_or_else(|| exn::Exn::from(ErrorKind::UnknownProvider(wanted.to_string())))
    }
}

/// One provider instance per kind, sharing a single HTTP client.
#[derive(Clone, Default)]
pub struct Providers {
    handles: HashMap<ProviderKind, ProviderHandle>,
}
impl Providers {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = HttpClient::new(settings)?;
        let debrid = &settings.debrid;
        Ok(Self::default()
            .with(Arc::new(AllDebrid::new(http.clone(), debrid.alldebrid.clone(), settings.addon_name.clone())))
            .with(Arc::new(TorBox::new(http.clone(), debrid.torbox.clone())))
            .with(Arc::new(Premiumize::new(http.clone(), debrid.premiumize.clone())))
            .with(Arc::new(OneFichier::new(http, debrid.onefichier.clone()))))
    }

    /// Register `handle` under its own kind, replacing any previous one.
    pub fn with(mut self, handle: ProviderHandle) -> Self {
        self.handles.insert(handle.kind(), handle);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderHandle> {
        self.handles.get(&kind)
    }
}
