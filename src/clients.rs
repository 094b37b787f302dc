//! Supported client variants and their capability sets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the installable/launchable client flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientVariant {
    Vanilla,
    MacSploit,
    Hydrogen,
    Ronix,
    Cryptic,
    Opiumware,
    Delta,
}

pub const CLIENT_VARIANTS: [ClientVariant; 7] = [
    ClientVariant::Vanilla,
    ClientVariant::MacSploit,
    ClientVariant::Hydrogen,
    ClientVariant::Ronix,
    ClientVariant::Cryptic,
    ClientVariant::Opiumware,
    ClientVariant::Delta,
];

/// Sandbox entitlements applied when patching the sandboxed (Delta) bundle.
pub const SANDBOX_ENTITLEMENTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?><!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd"><plist version="1.0"><dict><key>com.apple.security.app-sandbox</key><true/><key>com.apple.security.network.client</key><true/><key>com.apple.security.network.server</key><true/></dict></plist>"#;

impl ClientVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vanilla => "Vanilla",
            Self::MacSploit => "MacSploit",
            Self::Hydrogen => "Hydrogen",
            Self::Ronix => "Ronix",
            Self::Cryptic => "Cryptic",
            Self::Opiumware => "Opiumware",
            Self::Delta => "Delta",
        }
    }

    /// Delta ships as a Mac Catalyst .ipa and runs inside the app sandbox,
    /// so it takes the sandboxed environment/cookie/launch endpoints and
    /// skips the keychain unlock.
    pub fn is_sandboxed(self) -> bool {
        matches!(self, Self::Delta)
    }

    /// Variants without per-instance addressing that talk through the single
    /// shared bridge context.
    pub fn uses_shared_context(self) -> bool {
        matches!(self, Self::Hydrogen | Self::Ronix | Self::Cryptic)
    }

    /// Delta installs go through the .ipa conversion path.
    pub fn installs_as_ipa(self) -> bool {
        matches!(self, Self::Delta)
    }
}

impl fmt::Display for ClientVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CLIENT_VARIANTS
            .into_iter()
            .find(|variant| variant.as_str() == s)
            .ok_or_else(|| format!("Unknown client: {s}"))
    }
}
