use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// A conversation: the top-level unit of isolation for messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub name: String,
    /// Persistent persona appended to every request's system prompt
    pub system_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; threads are never removed physically
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Thread {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewThread {
    pub name: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl NewThread {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub(crate) fn into_thread(self, id: String, now: DateTime<Utc>) -> Thread {
        Thread {
            id,
            name: self.name,
            system_prompt: self.system_prompt,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Partial update of a thread. `system_prompt: Some(None)` clears the persona.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, with = "double_option")]
    pub system_prompt: Option<Option<String>>,
}

impl ThreadUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            system_prompt: None,
        }
    }

    pub fn system_prompt(prompt: Option<String>) -> Self {
        Self {
            name: None,
            system_prompt: Some(prompt),
        }
    }

    pub(crate) fn apply(self, thread: &mut Thread, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            thread.name = name;
        }
        if let Some(prompt) = self.system_prompt {
            thread.system_prompt = prompt;
        }
        thread.updated_at = now;
    }
}

/// Distinguishes a missing field (no change) from an explicit `null` (clear).
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_missing_field_keeps_prompt() {
        let update: ThreadUpdate = serde_json::from_str(r#"{"name":"renamed"}"#).unwrap();
        assert_eq!(update.name.as_deref(), Some("renamed"));
        assert_eq!(update.system_prompt, None);
    }

    #[test]
    fn test_update_null_clears_prompt() {
        let update: ThreadUpdate = serde_json::from_str(r#"{"system_prompt":null}"#).unwrap();
        assert_eq!(update.system_prompt, Some(None));

        let mut thread = NewThread::new("t").with_system_prompt("pirate").into_thread("id".into(), Utc::now());
        update.apply(&mut thread, Utc::now());
        assert_eq!(thread.system_prompt, None);
        assert_eq!(thread.name, "t");
    }
}
