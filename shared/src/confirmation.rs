use rand::Rng;

pub const CODE_PREFIX: &str = "RS-";
const CODE_LEN: usize = 8;
// No 0/O, 1/I/L: codes get read out over the phone.
const ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let body: String = (0..CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}{}", CODE_PREFIX, body)
}

pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
