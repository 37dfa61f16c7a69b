//! Keyboard and pointer automation used by the built-in handlers
//!
//! With the `automation` feature, text is entered through enigo, either
//! directly or by pasting from the clipboard. Without it every call fails
//! with `AutomationError::Unsupported`.

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("enigo error: {0}")]
    Enigo(String),
    #[error("clipboard error: {0}")]
    Clipboard(String),
    #[error("automation is not available in this build")]
    Unsupported,
}

/// Input method for typing text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMethod {
    /// Use enigo's native text input
    #[default]
    Direct,
    /// Copy to clipboard, then paste with Cmd/Ctrl+V
    Clipboard,
}

pub trait Automation: Send + Sync {
    fn type_text(&self, text: &str) -> Result<(), AutomationError>;
    fn move_pointer(&self, x: i32, y: i32) -> Result<(), AutomationError>;
}

pub struct UnsupportedAutomation;

impl Automation for UnsupportedAutomation {
    fn type_text(&self, _text: &str) -> Result<(), AutomationError> {
        Err(AutomationError::Unsupported)
    }

    fn move_pointer(&self, _x: i32, _y: i32) -> Result<(), AutomationError> {
        Err(AutomationError::Unsupported)
    }
}

/// The best backend this build supports
pub fn platform_default(method: InputMethod) -> Box<dyn Automation> {
    #[cfg(feature = "automation")]
    {
        Box::new(enigo_backend::EnigoAutomation::new(method))
    }
    #[cfg(not(feature = "automation"))]
    {
        let _ = method;
        Box::new(UnsupportedAutomation)
    }
}

#[cfg(feature = "automation")]
pub use enigo_backend::EnigoAutomation;

#[cfg(feature = "automation")]
mod enigo_backend {
    use super::{Automation, AutomationError, InputMethod};
    use arboard::Clipboard;
    use enigo::{Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
    use std::thread;
    use std::time::Duration;

    /// Enigo handles are not shareable across threads on every platform, so
    /// one is created per call.
    pub struct EnigoAutomation {
        method: InputMethod,
    }

    impl EnigoAutomation {
        pub fn new(method: InputMethod) -> Self {
            Self { method }
        }

        fn enigo() -> Result<Enigo, AutomationError> {
            Enigo::new(&Settings::default())
                .map_err(|e| AutomationError::Enigo(format!("Failed to initialize Enigo: {}", e)))
        }

        /// Cmd on macOS, Ctrl elsewhere
        fn modifier_key() -> Key {
            #[cfg(target_os = "macos")]
            {
                Key::Meta
            }
            #[cfg(not(target_os = "macos"))]
            {
                Key::Control
            }
        }

        fn type_direct(enigo: &mut Enigo, text: &str) -> Result<(), AutomationError> {
            enigo
                .text(text)
                .map_err(|e| AutomationError::Enigo(format!("Failed to type text: {}", e)))
        }

        fn type_via_clipboard(enigo: &mut Enigo, text: &str) -> Result<(), AutomationError> {
            let mut clipboard = Clipboard::new().map_err(|e| {
                AutomationError::Clipboard(format!("Failed to initialize clipboard: {}", e))
            })?;
            let old_content = clipboard.get_text().ok();

            clipboard
                .set_text(text)
                .map_err(|e| AutomationError::Clipboard(format!("Failed to set clipboard: {}", e)))?;
            thread::sleep(Duration::from_millis(50));

            let modifier = Self::modifier_key();
            let pasted = enigo
                .key(modifier, Direction::Press)
                .and_then(|_| enigo.key(Key::Unicode('v'), Direction::Click))
                .and_then(|_| enigo.key(modifier, Direction::Release))
                .map_err(|e| AutomationError::Enigo(format!("Paste failed: {}", e)));
            thread::sleep(Duration::from_millis(100));

            // Best effort
            if let Some(old) = old_content {
                let _ = clipboard.set_text(old);
            }
            pasted
        }
    }

    impl Automation for EnigoAutomation {
        fn type_text(&self, text: &str) -> Result<(), AutomationError> {
            if text.is_empty() {
                return Ok(());
            }
            let mut enigo = Self::enigo()?;
            match self.method {
                InputMethod::Direct => Self::type_direct(&mut enigo, text),
                InputMethod::Clipboard => Self::type_via_clipboard(&mut enigo, text)
                    .or_else(|e| {
                        tracing::warn!("Clipboard method failed: {}, trying direct", e);
                        Self::type_direct(&mut enigo, text)
                    }),
            }
        }

        fn move_pointer(&self, x: i32, y: i32) -> Result<(), AutomationError> {
            Self::enigo()?
                .move_mouse(x, y, Coordinate::Abs)
                .map_err(|e| AutomationError::Enigo(format!("Failed to move pointer: {}", e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        method: InputMethod,
    }

    #[test]
    fn test_input_method_from_config() {
        let w: Wrapper = toml::from_str(r#"method = "clipboard""#).unwrap();
        assert_eq!(w.method, InputMethod::Clipboard);
        let w: Wrapper = toml::from_str(r#"method = "direct""#).unwrap();
        assert_eq!(w.method, InputMethod::Direct);
        assert!(toml::from_str::<Wrapper>(r#"method = "telepathy""#).is_err());
    }

    #[test]
    fn test_unsupported_backend() {
        let backend = UnsupportedAutomation;
        assert!(matches!(backend.type_text("hi"), Err(AutomationError::Unsupported)));
        assert!(matches!(backend.move_pointer(1, 2), Err(AutomationError::Unsupported)));
    }
}
