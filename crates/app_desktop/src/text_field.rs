use core_types::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    Region,
    KnowledgeBase,
    Bucket,
    Prefix,
    Question,
}

impl FieldId {
    const ORDER: [FieldId; 5] = [
        FieldId::Region,
        FieldId::KnowledgeBase,
        FieldId::Bucket,
        FieldId::Prefix,
        FieldId::Question,
    ];

    pub fn next(self) -> Self {
        let index = Self::ORDER
            .iter()
            .position(|entry| *entry == self)
            .unwrap_or(0);
        Self::ORDER[(index + 1) % Self::ORDER.len()]
    }

    pub fn multiline(self) -> bool {
        self == FieldId::Question
    }

    pub fn label_key(self) -> &'static str {
        match self {
            FieldId::Region => "config.region",
            FieldId::KnowledgeBase => "config.kb",
            FieldId::Bucket => "config.bucket",
            FieldId::Prefix => "config.prefix",
            FieldId::Question => "ask.question",
        }
    }

    pub fn element_id(self) -> &'static str {
        match self {
            FieldId::Region => "field-region",
            FieldId::KnowledgeBase => "field-kb",
            FieldId::Bucket => "field-bucket",
            FieldId::Prefix => "field-prefix",
            FieldId::Question => "field-question",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Edited,
    FocusNext,
    Paste,
    Ignored,
}

/// Applies one key press to `value`. Paste is reported back so the caller
/// can read the clipboard.
pub fn apply_key(
    value: &mut String,
    field: FieldId,
    key: &str,
    key_char: Option<&str>,
    command: bool,
) -> KeyAction {
    if command {
        return if key == "v" {
            KeyAction::Paste
        } else {
            KeyAction::Ignored
        };
    }
    match key {
        "backspace" => {
            value.pop();
            KeyAction::Edited
        }
        "tab" => KeyAction::FocusNext,
        "enter" if field.multiline() => {
            value.push('\n');
            KeyAction::Edited
        }
        "enter" => KeyAction::FocusNext,
        _ => match key_char {
            Some(text) if !text.is_empty() && !text.chars().any(char::is_control) => {
                value.push_str(text);
                KeyAction::Edited
            }
            _ => KeyAction::Ignored,
        },
    }
}

/// Inserts pasted text; single-line fields keep only the first line.
pub fn insert_text(value: &mut String, field: FieldId, text: &str) {
    if field.multiline() {
        value.push_str(&text.replace("\r\n", "\n"));
    } else {
        value.push_str(text.lines().next().unwrap_or_default().trim());
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextFields {
    region: String,
    knowledge_base: String,
    bucket: String,
    prefix: String,
    question: String,
}

impl TextFields {
    pub fn from_session(session: &SessionConfig) -> Self {
        Self {
            region: session.region.clone().unwrap_or_default(),
            knowledge_base: session.knowledge_base_id.clone(),
            bucket: session.bucket.clone(),
            prefix: session.prefix.clone(),
            question: String::new(),
        }
    }

    pub fn get(&self, field: FieldId) -> &str {
        match field {
            FieldId::Region => &self.region,
            FieldId::KnowledgeBase => &self.knowledge_base,
            FieldId::Bucket => &self.bucket,
            FieldId::Prefix => &self.prefix,
            FieldId::Question => &self.question,
        }
    }

    pub fn get_mut(&mut self, field: FieldId) -> &mut String {
        match field {
            FieldId::Region => &mut self.region,
            FieldId::KnowledgeBase => &mut self.knowledge_base,
            FieldId::Bucket => &mut self.bucket,
            FieldId::Prefix => &mut self.prefix,
            FieldId::Question => &mut self.question,
        }
    }

    /// The configuration panel as it reads right now.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            region: Some(self.region.clone()),
            knowledge_base_id: self.knowledge_base.clone(),
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_and_backspace_edit_the_value() {
        let mut value = String::new();
        for ch in ["K", "B", "1"] {
            assert_eq!(
                apply_key(&mut value, FieldId::KnowledgeBase, ch, Some(ch), false),
                KeyAction::Edited
            );
        }
        apply_key(&mut value, FieldId::KnowledgeBase, "backspace", None, false);
        assert_eq!(value, "KB");
    }

    #[test]
    fn enter_adds_newline_only_in_the_question() {
        let mut question = "line".to_string();
        apply_key(&mut question, FieldId::Question, "enter", None, false);
        assert_eq!(question, "line\n");

        let mut bucket = "docs".to_string();
        assert_eq!(
            apply_key(&mut bucket, FieldId::Bucket, "enter", None, false),
            KeyAction::FocusNext
        );
        assert_eq!(bucket, "docs");
    }

    #[test]
    fn command_v_requests_paste() {
        let mut value = String::new();
        assert_eq!(
            apply_key(&mut value, FieldId::Bucket, "v", Some("v"), true),
            KeyAction::Paste
        );
        assert!(value.is_empty());

        insert_text(&mut value, FieldId::Bucket, " course-docs \nsecond line");
        assert_eq!(value, "course-docs");
    }

    #[test]
    fn tab_cycles_through_every_field() {
        let mut field = FieldId::Region;
        for _ in 0..5 {
            field = field.next();
        }
        assert_eq!(field, FieldId::Region);
    }

    #[test]
    fn blank_region_field_means_default_region() {
        let fields = TextFields::default();
        assert_eq!(fields.session().region(), None);
    }
}
