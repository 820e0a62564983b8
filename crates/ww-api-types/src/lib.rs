use serde::{Deserialize, Serialize};

/// Client-side cap on wish message length. The contract is the source of
/// truth; this only keeps obviously oversized input off the wire.
pub const MAX_MESSAGE_LEN: usize = 200;
/// Client-side cap on alias length.
pub const MAX_ALIAS_LEN: usize = 64;

/// The network the reference deployment lives on.
pub const SEPOLIA: ChainId = ChainId(11155111);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WishId(pub u64);

impl std::fmt::Display for WishId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    /// `0xAB12…CD34` shortening for status lines.
    pub fn short(&self) -> String {
        let raw = &self.0;
        if raw.len() <= 10 {
            return raw.clone();
        }
        format!("{}…{}", &raw[..6], &raw[raw.len() - 4..])
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ContractAddress(pub String);

/// Opaque reference to an encrypted counter stored on-chain. Meaningless
/// without the relayer SDK; the client only caches it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CipherHandle(pub String);

/// One wish record as returned by the contract. `alias_name` is empty when
/// the author did not pick one; `cheers_mirror` is a non-authoritative,
/// possibly stale plaintext copy of the encrypted counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wish {
    pub id: WishId,
    pub author: WalletAddress,
    pub message: String,
    pub alias_name: String,
    pub created_at: u64,
    pub cheers_handle: CipherHandle,
    pub cheers_mirror: Option<u32>,
}

impl Wish {
    /// Alias if set, otherwise the shortened author address.
    pub fn display_name(&self) -> String {
        if self.alias_name.is_empty() {
            self.author.short()
        } else {
            self.alias_name.clone()
        }
    }
}

/// Relayer SDK lifecycle. One bootstrap attempt per environment; both
/// terminal states stick until a full reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "phase", content = "detail")]
pub enum SdkPhase {
    Uninitialized,
    Bootstrapping,
    Ready,
    Error(String),
}

impl SdkPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SdkPhase::Ready | SdkPhase::Error(_))
    }
}

/// Every failure the application surfaces. Collaborator faults are converted
/// into one of these at their origin, keeping the underlying message for
/// display; none propagate as raw unhandled errors.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("no wallet provider detected in this environment")]
    WalletUnavailable,

    #[error("wallet authorization rejected: {0}")]
    UserRejected(String),

    #[error("relayer SDK could not be loaded: {0}")]
    SdkLoadFailed(String),

    #[error("relayer SDK is missing required capabilities: {0}")]
    SdkIncompatible(String),

    #[error("relayer SDK initialization failed: {0}")]
    SdkInitFailed(String),

    #[error("no deployment configured for chain {0}")]
    Unconfigured(ChainId),

    #[error("failed to read from the board: {0}")]
    ReadFailed(String),

    #[error("write rejected: {0}")]
    WriteRejected(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("not ready: {0}")]
    NotReady(String),

    #[error("a cheer for wish #{0} is already in flight")]
    AlreadyInFlight(WishId),

    #[error("failed to encrypt input: {0}")]
    EncryptionFailed(String),

    #[error("no decryption capability available on this SDK instance")]
    DecryptionUnavailable,

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_address_keeps_ends() {
        let addr = WalletAddress("0xAB12345678901234567890123456789012345612".to_owned());
        assert_eq!(addr.short(), "0xAB12…5612");
    }

    #[test]
    fn short_address_passes_tiny_values_through() {
        let addr = WalletAddress("0xAB12".to_owned());
        assert_eq!(addr.short(), "0xAB12");
    }

    #[test]
    fn display_name_prefers_alias() {
        let wish = Wish {
            id: WishId(1),
            author: WalletAddress("0xAB12345678901234567890123456789012345612".to_owned()),
            message: "I wish for rain".to_owned(),
            alias_name: "Stargazer".to_owned(),
            created_at: 1_700_000_000,
            cheers_handle: CipherHandle("0x00".to_owned()),
            cheers_mirror: None,
        };
        assert_eq!(wish.display_name(), "Stargazer");

        let anonymous = Wish {
            alias_name: String::new(),
            ..wish
        };
        assert_eq!(anonymous.display_name(), "0xAB12…5612");
    }

    #[test]
    fn sdk_phase_terminality() {
        assert!(!SdkPhase::Uninitialized.is_terminal());
        assert!(!SdkPhase::Bootstrapping.is_terminal());
        assert!(SdkPhase::Ready.is_terminal());
        assert!(SdkPhase::Error("boom".to_owned()).is_terminal());
    }

    #[test]
    fn wish_serde_roundtrip() {
        let wish = Wish {
            id: WishId(7),
            author: WalletAddress("0xAB".to_owned()),
            message: "hello".to_owned(),
            alias_name: String::new(),
            created_at: 42,
            cheers_handle: CipherHandle("0xdead".to_owned()),
            cheers_mirror: Some(3),
        };
        let encoded = serde_json::to_string(&wish).unwrap();
        let decoded: Wish = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, wish);
    }

    #[test]
    fn error_messages_carry_collaborator_text() {
        let err = BoardError::WriteFailed("reverted: out of gas".to_owned());
        assert!(err.to_string().contains("out of gas"));
        assert_eq!(
            BoardError::Unconfigured(ChainId(31337)).to_string(),
            "no deployment configured for chain 31337"
        );
    }
}
