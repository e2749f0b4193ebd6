use serenity::model::id::UserId;
use std::collections::HashSet;

/// Votos emitidos frente a votos necesarios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    pub votes: usize,
    pub required: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Salto directo: pocos oyentes, usuario con privilegios o votación desactivada
    Immediate,
    /// Se alcanzó el umbral
    Passed(VoteTally),
    /// Voto registrado, faltan más
    Pending(VoteTally),
}

impl VoteOutcome {
    pub fn skips(&self) -> bool {
        !matches!(self, VoteOutcome::Pending(_))
    }
}

/// Votos para saltar la pista actual; se vacía cada vez que cambia la pista
#[derive(Debug)]
pub struct VoteSkipCoordinator {
    voters: HashSet<UserId>,
    enabled: bool,
    ratio: f64,
}

impl VoteSkipCoordinator {
    pub fn new(enabled: bool, ratio: f64) -> Self {
        Self {
            voters: HashSet::new(),
            enabled,
            ratio,
        }
    }

    /// `ceil(listeners × ratio)`, como mínimo un voto
    pub fn required_votes(&self, listeners: usize) -> usize {
        ((listeners as f64 * self.ratio).ceil() as usize).max(1)
    }

    /// Registra el voto de `voter` con `listeners` oyentes humanos en el canal
    pub fn register_vote(&mut self, voter: UserId, listeners: usize, privileged: bool) -> VoteOutcome {
        if !self.enabled || privileged || listeners < 2 {
            return VoteOutcome::Immediate;
        }

        self.voters.insert(voter);
        let tally = VoteTally {
            votes: self.voters.len(),
            required: self.required_votes(listeners),
        };

        if tally.votes >= tally.required {
            VoteOutcome::Passed(tally)
        } else {
            VoteOutcome::Pending(tally)
        }
    }

    pub fn votes(&self) -> usize {
        self.voters.len()
    }

    pub fn reset(&mut self) {
        self.voters.clear();
    }
}
