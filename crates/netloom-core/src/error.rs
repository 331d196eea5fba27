use thiserror::Error;

/// Every error kind the runtime can surface, from wire framing up through the protocol
/// pipeline and timeout events. Framing errors wrap [`netloom_wire::WireError`]; the
/// rest name a specific pipeline stage or timeout condition.
#[derive(Debug, Error)]
pub enum NetError {
    #[error(transparent)]
    Wire(#[from] netloom_wire::WireError),

    #[error("payload checksum did not match the header")]
    RcvChecksum,
    #[error("no connection registered for this message")]
    RcvConNil,
    #[error("access provider denied this connection")]
    NoAccess,
    #[error("access provider rejected the client")]
    AuthClient,
    #[error("no message processor registered for signature {0}")]
    NoProvider(u16),
    #[error("decryption failed")]
    RcvDecrypt,
    #[error("decompression failed")]
    RcvDecompress,
    #[error("deserialization failed: {0}")]
    Deserialize(String),
    #[error("compression failed")]
    SendCompress,
    #[error("encryption failed")]
    SendEncrypt,
    #[error("no connection registered for id {0}")]
    SendInvalidCli(u32),
    #[error("message type {0} is not a valid signature")]
    SendInvalidMsgType(u16),
    #[error("serialization failed: {0}")]
    Serialize(String),

    #[error("timed out waiting for a connection to complete")]
    TimeoutConnect,
    #[error("timed out waiting for a disconnect to complete")]
    TimeoutDisconnect,
    #[error("general operation timed out")]
    TimeoutGeneral,
    #[error("timed out waiting to receive a message")]
    TimeoutRcv,
    #[error("timed out sending message type {0}")]
    TimeoutSend(u16),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type NetResult<T> = Result<T, NetError>;
