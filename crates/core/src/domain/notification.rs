// Notification Marker & Message Type

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Payload that can travel through the broker.
///
/// The broker never looks inside a notification; handlers are selected purely by
/// the Rust type, so implementing this marker is all a payload needs:
///
/// ```text
/// #[derive(Debug)]
/// struct UserEnrolled { user_id: i64 }
/// impl Notification for UserEnrolled {}
/// ```
pub trait Notification: Any + Send + Sync + fmt::Debug {}

/// Runtime identity of a notification type (registry key)
#[derive(Clone, Copy)]
pub struct MessageType {
    id: TypeId,
    name: &'static str,
}

impl MessageType {
    pub fn of<N: Notification>() -> Self {
        Self {
            id: TypeId::of::<N>(),
            name: std::any::type_name::<N>(),
        }
    }

    /// Fully qualified type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name with every module path stripped, used in log lines
    ///
    /// `app::Wrapper<app::events::Sent>` becomes `Wrapper<Sent>`.
    pub fn short_name(&self) -> String {
        let mut out = String::with_capacity(self.name.len());
        let mut segment_start = 0;
        let mut chars = self.name.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                ':' if chars.peek() == Some(&':') => {
                    chars.next();
                    out.truncate(segment_start);
                }
                c if c.is_alphanumeric() || c == '_' => out.push(c),
                c => {
                    out.push(c);
                    segment_start = out.len();
                }
            }
        }
        out
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageType {}

impl Hash for MessageType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct AppOpened;
    impl Notification for AppOpened {}

    #[derive(Debug)]
    struct UserEnrolled;
    impl Notification for UserEnrolled {}

    #[test]
    fn test_message_type_identity() {
        assert_eq!(MessageType::of::<AppOpened>(), MessageType::of::<AppOpened>());
        assert_ne!(MessageType::of::<AppOpened>(), MessageType::of::<UserEnrolled>());
    }

    #[test]
    fn test_short_name_strips_module_path() {
        let ty = MessageType::of::<AppOpened>();
        assert!(ty.name().ends_with("::AppOpened"));
        assert_eq!(ty.short_name(), "AppOpened");
        assert_eq!(ty.to_string(), "AppOpened");
    }

    #[derive(Debug)]
    #[allow(dead_code)]
    struct Batch<T>(Vec<T>);
    impl<T: fmt::Debug + Send + Sync + 'static> Notification for Batch<T> {}

    #[test]
    fn test_short_name_strips_generic_arguments_paths() {
        let ty = MessageType::of::<Batch<AppOpened>>();
        assert_eq!(ty.short_name(), "Batch<AppOpened>");

        let nested = MessageType::of::<Batch<(UserEnrolled, Option<AppOpened>)>>();
        assert_eq!(nested.short_name(), "Batch<(UserEnrolled, Option<AppOpened>)>");
    }
}
