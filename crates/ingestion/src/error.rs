//! Ingestion 错误类型

use contracts::ZenError;
use thiserror::Error;

/// 帧解析错误
///
/// 解析错误只在接收线程内部恢复 (丢弃一个字节后重新同步)，不会传播给调用方。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// 期望帧起始符
    #[error("expected start of frame")]
    ExpectedStart,

    /// 校验和不匹配
    #[error("checksum invalid: expected {expected:#06x}, received {received:#06x}")]
    ChecksumInvalid {
        /// 根据帧内容计算出的校验和
        expected: u16,
        /// 帧中携带的校验和
        received: u16,
    },

    /// 期望帧结束符 (CR LF)
    #[error("expected end of frame")]
    ExpectedEnd,

    /// ASCII 帧中出现非十六进制字符
    #[error("unexpected character {0:#04x}")]
    UnexpectedCharacter(u8),

    /// 解析器已完成，需先 reset
    #[error("parser finished, reset required")]
    Finished,
}

impl From<ParseError> for ZenError {
    fn from(_: ParseError) -> Self {
        ZenError::IoMsgCorrupt
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, ParseError>;
