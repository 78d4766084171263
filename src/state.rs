use crate::layer::LayerId;

/// Where the engine is in a gesture's begin → move* → end sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    Active {
        /// The layer the gesture paints into
        layer: LayerId,
        /// Moves seen so far
        moves: usize,
    },
}

impl GestureState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn layer(&self) -> Option<LayerId> {
        match self {
            Self::Active { layer, .. } => Some(*layer),
            Self::Idle => None,
        }
    }

    pub(crate) fn record_move(&mut self) {
        if let Self::Active { moves, .. } = self {
            *moves += 1;
        }
    }
}
