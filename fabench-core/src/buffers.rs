use rand::{Rng, seq::index};

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Vec<f32>,
    pub action: usize,
    pub next_state: Vec<f32>,
    pub reward: f32,
    pub done: bool,
}

/// Fixed capacity ring of transitions, the oldest one is overwritten once full.
#[derive(Debug)]
pub struct ReplayBuffer {
    transitions: Vec<Transition>,
    capacity: usize,
    index: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            // capacities in the presets go up to 1e7, so we do not preallocate
            transitions: vec![],
            capacity,
            index: 0,
        }
    }

    pub fn push(&mut self, transition: Transition) {
        if self.transitions.len() < self.capacity {
            self.transitions.push(transition);
        } else {
            self.transitions[self.index] = transition;
        }
        self.index = (self.index + 1) % self.capacity;
    }

    /// Samples `batch_size` distinct transitions, or everything when fewer are stored.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<Transition> {
        let amount = batch_size.min(self.transitions.len());
        index::sample(rng, self.transitions.len(), amount)
            .into_iter()
            .map(|idx| self.transitions[idx].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn transition(reward: f32) -> Transition {
        Transition {
            state: vec![0.],
            action: 0,
            next_state: vec![0.],
            reward,
            done: false,
        }
    }

    #[test]
    fn overwrites_oldest_when_full() {
        let mut buffer = ReplayBuffer::new(3);
        for reward in 0..5 {
            buffer.push(transition(reward as f32));
        }
        assert_eq!(buffer.len(), 3);
        let mut rng = StdRng::seed_from_u64(0);
        let mut rewards: Vec<f32> = buffer.sample(3, &mut rng).iter().map(|t| t.reward).collect();
        rewards.sort_by(f32::total_cmp);
        assert_eq!(rewards, vec![2., 3., 4.]);
    }

    #[test]
    fn sample_is_capped_by_len() {
        let mut buffer = ReplayBuffer::new(10);
        buffer.push(transition(1.));
        buffer.push(transition(2.));
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(buffer.sample(32, &mut rng).len(), 2);
    }
}
