//! Value Objects
//!
//! プロトコルから受け取った文字列は、ここで正規化・検証してからドメインに入る。
//! 検証に失敗した値はサーバー側では「不正な入力」として黙って破棄される。

use std::fmt;

use subtle::ConstantTimeEq;

use super::error::ValueObjectError;

/// Collapse internal whitespace runs to one space and strip both ends.
fn simplified(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 接続ごとに払い出されるセッション ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// ユーザー名（空白を正規化済み、空でない）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Username(String);

impl Username {
    pub fn new(raw: &str) -> Result<Self, ValueObjectError> {
        let value = simplified(raw);
        if value.is_empty() {
            return Err(ValueObjectError::EmptyUsername);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// グループ名（空白を正規化済み、空でない）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupName(String);

impl GroupName {
    pub fn new(raw: &str) -> Result<Self, ValueObjectError> {
        let value = simplified(raw);
        if value.is_empty() {
            return Err(ValueObjectError::EmptyGroupName);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// クライアント側でハッシュ化済みのパスワード
///
/// 比較は定数時間で行う。`Debug` では中身を出さない。
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    pub fn new(raw: &str) -> Result<Self, ValueObjectError> {
        let value = simplified(raw);
        if value.is_empty() {
            return Err(ValueObjectError::EmptyPassword);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a stored digest
    pub fn matches(&self, stored: &PasswordDigest) -> bool {
        self.0.as_bytes().ct_eq(stored.0.as_bytes()).into()
    }
}

impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordDigest(**redacted**)")
    }
}

/// メッセージ本文（前後の空白を除去済み、空でない）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageText(String);

impl MessageText {
    pub fn new(raw: &str) -> Result<Self, ValueObjectError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(ValueObjectError::EmptyMessageText);
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// 送信時刻（クライアントが付与した表示用文字列、例: `"14:05"`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTime(String);

impl MessageTime {
    pub fn new(raw: &str) -> Result<Self, ValueObjectError> {
        if raw.is_empty() {
            return Err(ValueObjectError::EmptyMessageTime);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}
