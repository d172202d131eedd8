//! Integer primary keys, one newtype per table.

/// Declare an `i32` key newtype.
///
/// The type serializes as a bare number, parses from path segments and CLI
/// arguments, and (with the `postgres` feature) binds and decodes as `INT4`.
///
/// ```rust
/// # use studyforge_core::define_id;
/// define_id!(LessonId);
/// define_id!(QuizId);
///
/// let lesson = LessonId::new(1);
/// // let _: QuizId = lesson; // mismatched types
/// assert_eq!(lesson.as_i32(), 1);
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[cfg_attr(feature = "postgres", derive(::sqlx::Type), sqlx(transparent))]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::core::num::ParseIntError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

define_id!(AdminUserId);
define_id!(AdminSessionId);
define_id!(LearnerId);
define_id!(CurriculumId);
define_id!(NoteId);
define_id!(FeedbackId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parse_from_path_segment() {
        let id: LearnerId = "42".parse().unwrap();
        assert_eq!(id.as_i32(), 42);
        assert!("forty-two".parse::<LearnerId>().is_err());
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = AdminUserId::new(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        let back: AdminUserId = serde_json::from_str("7").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_id_display_and_order() {
        assert_eq!(CurriculumId::new(3).to_string(), "3");
        assert!(LearnerId::new(2) < LearnerId::new(10));
        assert_eq!(" 5 ".parse::<AdminSessionId>().unwrap(), AdminSessionId::new(5));
    }
}
