//! Decides which chat messages get read aloud

use rand::Rng;

use crate::protocol::ChatEvent;

#[derive(Clone, Debug, PartialEq)]
pub struct SpeakFilter {
    /// Only read messages from `specific_users`
    pub specific_users_only: bool,
    /// Lowercased allow-list used when `specific_users_only` is set
    pub specific_users: Vec<String>,
    /// Chance in percent that any other message is read
    pub chance_percentage: f32,
}

impl Default for SpeakFilter {
    fn default() -> Self {
        Self {
            specific_users_only: false,
            specific_users: Vec::new(),
            chance_percentage: 100.0,
        }
    }
}

impl SpeakFilter {
    pub fn new(specific_users_only: bool, specific_users: &[String], chance_percentage: f32) -> Self {
        Self {
            specific_users_only,
            specific_users: specific_users.iter().map(|u| u.to_lowercase()).collect(),
            chance_percentage,
        }
    }

    /// Whether `event` should be synthesized. Announcements always pass.
    pub fn should_speak<R: Rng + ?Sized>(&self, event: &ChatEvent, rng: &mut R) -> bool {
        if event.is_announcement() {
            return true;
        }
        if self.specific_users_only {
            let username = event.username.to_lowercase();
            return self.specific_users.iter().any(|u| *u == username);
        }

        let chance = if self.chance_percentage.is_finite() {
            self.chance_percentage.clamp(0.0, 100.0)
        } else {
            100.0
        };
        if chance >= 100.0 {
            return true;
        }
        rng.random_bool(f64::from(chance) / 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn event(username: &str) -> ChatEvent {
        ChatEvent {
            username: username.to_string(),
            email: format!("{username}@{username}.tmi.twitch.tv"),
            channel: "chan".to_string(),
            content: "hi".to_string(),
        }
    }

    #[test]
    fn test_default_speaks_everything() {
        let filter = SpeakFilter::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert!((0..100).all(|_| filter.should_speak(&event("a"), &mut rng)));
    }

    #[test]
    fn test_specific_users_case_insensitive() {
        let filter = SpeakFilter::new(true, &["Alice".to_string()], 0.0);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(filter.should_speak(&event("alice"), &mut rng));
        assert!(!filter.should_speak(&event("bob"), &mut rng));
    }

    #[test]
    fn test_zero_chance_only_announcements() {
        let filter = SpeakFilter::new(false, &[], 0.0);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(!(0..100).any(|_| filter.should_speak(&event("a"), &mut rng)));
        assert!(filter.should_speak(&ChatEvent::announcement("hello"), &mut rng));
    }

    #[test]
    fn test_partial_chance_speaks_some() {
        let filter = SpeakFilter::new(false, &[], 50.0);
        let mut rng = StdRng::seed_from_u64(11);
        let spoken = (0..1000)
            .filter(|_| filter.should_speak(&event("a"), &mut rng))
            .count();
        assert!((300..700).contains(&spoken), "spoken {spoken} of 1000");
    }

    #[test]
    fn test_out_of_range_chance_is_clamped() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(SpeakFilter::new(false, &[], 250.0).should_speak(&event("a"), &mut rng));
        assert!(!SpeakFilter::new(false, &[], -5.0).should_speak(&event("a"), &mut rng));
    }
}
