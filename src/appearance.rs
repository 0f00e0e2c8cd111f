//! Background theme selection
//!
//! One value per controller, published over a watch channel so any number of
//! views can follow it and drop their receiver when they go away.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Background {
    #[default]
    #[serde(rename = "bg-one")]
    One,
    #[serde(rename = "bg-two")]
    Two,
    #[serde(rename = "bg-three")]
    Three,
    #[serde(rename = "bg-four")]
    Four,
    #[serde(rename = "bg-five")]
    Five,
}

impl Background {
    pub const ALL: [Background; 5] = [
        Background::One,
        Background::Two,
        Background::Three,
        Background::Four,
        Background::Five,
    ];

    /// Style class name used by the rendering layer
    pub fn class_name(self) -> &'static str {
        match self {
            Background::One => "bg-one",
            Background::Two => "bg-two",
            Background::Three => "bg-three",
            Background::Four => "bg-four",
            Background::Five => "bg-five",
        }
    }

    pub fn from_class_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|bg| bg.class_name() == name)
    }
}

#[derive(Debug)]
pub struct Appearance {
    background: watch::Sender<Background>,
}

impl Appearance {
    pub fn new(initial: Background) -> Self {
        let (background, _) = watch::channel(initial);
        Self { background }
    }

    pub fn background(&self) -> Background {
        *self.background.borrow()
    }

    /// Change the background. Subscribers are only woken by an actual change.
    pub fn set_background(&self, background: Background) {
        let changed = self.background.send_if_modified(|current| {
            if *current == background {
                return false;
            }
            *current = background;
            true
        });
        if changed {
            tracing::debug!("background set to {}", background.class_name());
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Background> {
        self.background.subscribe()
    }
}

impl Default for Appearance {
    fn default() -> Self {
        Self::new(Background::default())
    }
}
