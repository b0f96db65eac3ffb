use rand::Rng;

use crate::RoomId;

const ADJECTIVES: &[&str] = &[
    "Swift", "Brave", "Clever", "Mighty", "Silent", "Golden", "Wild", "Noble",
    "Fierce", "Gentle", "Quick", "Wise", "Bold", "Proud", "Cunning", "Sly",
];

const NOUNS: &[&str] = &[
    "Falcon", "Bear", "Tiger", "Wolf", "Eagle", "Dragon", "Lion", "Panther",
    "Hawk", "Fox", "Raven", "Cobra", "Shark", "Phoenix", "Lynx", "Viper",
];

const INVITE_SEPARATOR: char = '~';

pub fn generate_player_name() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];
    format!("{} {}", adjective, noun)
}

/// Builds a shareable invite code for a private room: a readable
/// `Adjective-Noun` label followed by the room id.
pub fn generate_invite_code(room_id: &RoomId) -> String {
    let label = generate_player_name().replace(' ', "-");
    format!("{}{}{}", label, INVITE_SEPARATOR, room_id)
}

pub fn room_id_from_invite_code(code: &str) -> Option<RoomId> {
    let (_, id) = code.trim().rsplit_once(INVITE_SEPARATOR)?;
    if id.is_empty() {
        return None;
    }
    Some(RoomId::new(id))
}
