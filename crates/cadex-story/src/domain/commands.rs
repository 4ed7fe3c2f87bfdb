//! Commands for the story context.

use cadex_core::command::Command;
use uuid::Uuid;

/// Command to create a story with its admin as first player.
#[derive(Debug, Clone)]
pub struct NewStory {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Display name of the admin.
    pub name: String,
    /// Real identity of the admin.
    pub uid: String,
    /// Optional display color.
    pub color: Option<String>,
}

impl Command for NewStory {
    fn command_type(&self) -> &'static str {
        "story.new_story"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn story_id(&self) -> Option<Uuid> {
        None
    }
}

/// Command to fix the turn order and begin play.
#[derive(Debug, Clone)]
pub struct StartStory {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The story to start.
    pub story_id: Uuid,
    /// Real identity of the caller; must be the admin.
    pub uid: String,
}

impl Command for StartStory {
    fn command_type(&self) -> &'static str {
        "story.start_story"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn story_id(&self) -> Option<Uuid> {
        Some(self.story_id)
    }
}

/// Command to join a story.
#[derive(Debug, Clone)]
pub struct NewPlayer {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The story to join.
    pub story_id: Uuid,
    /// Real identity of the joining player.
    pub uid: String,
    /// Display name.
    pub name: String,
    /// Optional display color.
    pub color: Option<String>,
}

impl Command for NewPlayer {
    fn command_type(&self) -> &'static str {
        "story.new_player"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn story_id(&self) -> Option<Uuid> {
        Some(self.story_id)
    }
}

/// Command to submit a contribution for the current lap.
#[derive(Debug, Clone)]
pub struct Play {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The story being played.
    pub story_id: Uuid,
    /// Real identity of the player.
    pub uid: String,
    /// Text that becomes public when the story closes.
    pub head: String,
    /// Fragment handed to the next player.
    pub tail: String,
}

impl Command for Play {
    fn command_type(&self) -> &'static str {
        "story.play"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn story_id(&self) -> Option<Uuid> {
        Some(self.story_id)
    }
}

/// Command to change a player's display attributes.
#[derive(Debug, Clone)]
pub struct UpdatePlayer {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The story the player belongs to.
    pub story_id: Uuid,
    /// Real identity of the player.
    pub uid: String,
    /// New display name, if changing.
    pub name: Option<String>,
    /// New display color, if changing.
    pub color: Option<String>,
}

impl Command for UpdatePlayer {
    fn command_type(&self) -> &'static str {
        "story.update_player"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn story_id(&self) -> Option<Uuid> {
        Some(self.story_id)
    }
}

/// Command to close a story and publish every contribution.
#[derive(Debug, Clone)]
pub struct CloseStory {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The story to close.
    pub story_id: Uuid,
    /// Real identity of the caller; must be the admin.
    pub uid: String,
}

impl Command for CloseStory {
    fn command_type(&self) -> &'static str {
        "story.close_story"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn story_id(&self) -> Option<Uuid> {
        Some(self.story_id)
    }
}
