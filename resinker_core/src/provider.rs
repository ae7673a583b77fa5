//! Realistic-value providers.
//!
//! Schemas can delegate a field to `faker.<provider>.<method>`; the engine
//! resolves that path through the [`RealisticProvider`] trait and never
//! depends on a concrete faker library. [`CommerceProvider`] is the built-in
//! implementation backed by word lists; every draw comes from the
//! caller-supplied RNG so provider output honors the seed contract.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde_json::Value;
use thiserror::Error;

/// Errors from a realistic-value provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The method path is not served by this provider
    #[error("unknown provider method: {0}")]
    UnknownMethod(String),

    /// A parameter had the wrong shape for the method
    #[error("bad parameter for {method}: {detail}")]
    BadParameter { method: String, detail: String },
}

/// Named library of realistic string/number generators.
///
/// `method_path` is the part after the `faker.` prefix, e.g.
/// `ecommerce.product_name` or just `email`.
pub trait RealisticProvider: Send + Sync {
    fn generate(
        &self,
        method_path: &str,
        params: &serde_json::Map<String, Value>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, ProviderError>;
}

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bruno", "Carmen", "Diego", "Elena", "Felix", "Greta", "Hassan", "Ingrid", "Jonas",
    "Kira", "Lucas", "Mina", "Noah", "Olivia", "Pavel", "Quinn", "Rosa", "Samuel", "Tara",
    "Umar", "Vera", "Wesley", "Xenia", "Yusuf", "Zoe",
];

const LAST_NAMES: &[&str] = &[
    "Almeida", "Becker", "Costa", "Dubois", "Eriksen", "Fischer", "Garcia", "Hoffmann", "Ivanov",
    "Jansen", "Kowalski", "Larsen", "Moreau", "Nguyen", "Okafor", "Peterson", "Quintero", "Rossi",
    "Schmidt", "Tanaka", "Ueda", "Vasquez", "Weber", "Yamamoto", "Zhang",
];

const EMAIL_DOMAINS: &[&str] = &[
    "example.com", "example.org", "example.net", "mail.test", "inbox.test",
];

const STREET_SUFFIXES: &[&str] = &["Street", "Avenue", "Lane", "Road", "Boulevard", "Way"];

const CITIES: &[&str] = &[
    "Springfield", "Riverton", "Lakeside", "Fairview", "Georgetown", "Ashford", "Millbrook",
    "Oakdale", "Brighton", "Clayton",
];

const COUNTRIES: &[&str] = &[
    "United States", "Germany", "Brazil", "Japan", "Canada", "France", "Australia", "Spain",
    "Netherlands", "Sweden",
];

const COMPANY_SUFFIXES: &[&str] = &["Labs", "Group", "Systems", "Industries", "Partners", "Co"];

const WORDS: &[&str] = &[
    "amber", "basin", "cedar", "delta", "ember", "fable", "grove", "harbor", "inlet", "juniper",
    "kettle", "lumen", "meadow", "nectar", "orchard", "pebble", "quartz", "ridge", "summit",
    "thicket", "umbra", "vertex", "willow", "zenith",
];

const PRODUCT_CATEGORIES: &[&str] = &[
    "Electronics", "Clothing", "Home & Kitchen", "Books", "Beauty", "Sports", "Toys",
    "Automotive", "Health", "Pet Supplies",
];

const PRODUCT_ADJECTIVES: &[&str] = &[
    "Premium", "Deluxe", "Essential", "Professional", "Ultra", "Smart", "Portable", "Wireless",
    "Digital", "Organic", "Vintage", "Modern", "Lightweight", "Durable", "Advanced",
];

const PRODUCT_TYPES: &[(&str, &[&str])] = &[
    ("Electronics", &["Headphones", "Smartphone", "Laptop", "Tablet", "Camera", "Smartwatch", "Speaker", "Monitor", "Keyboard"]),
    ("Clothing", &["T-Shirt", "Jeans", "Dress", "Jacket", "Sweater", "Hat", "Scarf", "Sneakers"]),
    ("Home & Kitchen", &["Blender", "Coffee Maker", "Toaster", "Microwave", "Lamp", "Pillow", "Blanket"]),
    ("Books", &["Novel", "Cookbook", "Biography", "Textbook", "Guide", "Journal"]),
    ("Beauty", &["Lipstick", "Moisturizer", "Shampoo", "Face Mask", "Perfume"]),
    ("Sports", &["Yoga Mat", "Dumbbells", "Tennis Racket", "Basketball", "Bicycle", "Running Shoes"]),
    ("Toys", &["Action Figure", "Board Game", "Puzzle", "Plush Toy", "Building Blocks"]),
    ("Automotive", &["Car Seat", "Floor Mats", "Car Charger", "Tool Kit"]),
    ("Health", &["Vitamins", "First Aid Kit", "Thermometer", "Heating Pad"]),
    ("Pet Supplies", &["Dog Food", "Pet Bed", "Pet Toy", "Leash", "Collar"]),
];

/// Built-in provider covering person, internet, address, company, and
/// commerce methods.
#[derive(Debug, Default)]
pub struct CommerceProvider;

impl CommerceProvider {
    pub fn new() -> Self {
        Self
    }

    fn first_name(rng: &mut dyn RngCore) -> &'static str {
        pick(FIRST_NAMES, rng)
    }

    fn last_name(rng: &mut dyn RngCore) -> &'static str {
        pick(LAST_NAMES, rng)
    }

    fn product_name(rng: &mut dyn RngCore) -> String {
        let (category, types) = PRODUCT_TYPES
            .choose(rng)
            .copied()
            .unwrap_or(PRODUCT_TYPES[0]);
        let adjective = pick(PRODUCT_ADJECTIVES, rng);
        let product_type = pick(types, rng);
        // Occasionally include the category in the name, as real listings do
        if rng.gen_bool(0.3) {
            format!("{adjective} {category} {product_type}")
        } else {
            format!("{adjective} {product_type}")
        }
    }
}

fn pick<'a>(options: &'a [&'a str], rng: &mut dyn RngCore) -> &'a str {
    options.choose(rng).copied().unwrap_or("")
}

impl RealisticProvider for CommerceProvider {
    fn generate(
        &self,
        method_path: &str,
        params: &serde_json::Map<String, Value>,
        rng: &mut dyn RngCore,
    ) -> Result<Value, ProviderError> {
        // Accept both `person.first_name` and bare `first_name` forms; the
        // final segment selects the method.
        let method = method_path.rsplit('.').next().unwrap_or(method_path);
        let value = match method {
            "first_name" => Value::String(Self::first_name(rng).to_string()),
            "last_name" => Value::String(Self::last_name(rng).to_string()),
            "name" | "full_name" => Value::String(format!(
                "{} {}",
                Self::first_name(rng),
                Self::last_name(rng)
            )),
            "email" => {
                let first = Self::first_name(rng).to_lowercase();
                let last = Self::last_name(rng).to_lowercase();
                let number: u16 = rng.gen_range(1..1000);
                let domain = pick(EMAIL_DOMAINS, rng);
                Value::String(format!("{first}.{last}{number}@{domain}"))
            }
            "user_name" | "username" => {
                let first = Self::first_name(rng).to_lowercase();
                let number: u16 = rng.gen_range(1..10000);
                Value::String(format!("{first}_{number}"))
            }
            "street_address" => {
                let number: u16 = rng.gen_range(1..2000);
                let street = capitalize(pick(WORDS, rng));
                let suffix = pick(STREET_SUFFIXES, rng);
                Value::String(format!("{number} {street} {suffix}"))
            }
            "city" => Value::String(pick(CITIES, rng).to_string()),
            "country" => Value::String(pick(COUNTRIES, rng).to_string()),
            "company" => Value::String(format!(
                "{} {}",
                capitalize(pick(WORDS, rng)),
                pick(COMPANY_SUFFIXES, rng)
            )),
            "phone_number" => {
                let area: u16 = rng.gen_range(200..1000);
                let exchange: u16 = rng.gen_range(200..1000);
                let line: u16 = rng.gen_range(0..10000);
                Value::String(format!("+1-{area}-{exchange}-{line:04}"))
            }
            "word" => Value::String(pick(WORDS, rng).to_string()),
            "sentence" => {
                let count = params
                    .get("nb_words")
                    .and_then(Value::as_u64)
                    .unwrap_or(6)
                    .max(1) as usize;
                let mut words: Vec<&str> = (0..count).map(|_| pick(WORDS, rng)).collect();
                let first = capitalize(words.remove(0));
                Value::String(format!("{} {}.", first, words.join(" ")))
            }
            "product_name" => Value::String(Self::product_name(rng)),
            _ => return Err(ProviderError::UnknownMethod(method_path.to_string())),
        };
        Ok(value)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn generate(method: &str, seed: u64) -> Value {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        CommerceProvider::new()
            .generate(method, &serde_json::Map::new(), &mut rng)
            .unwrap()
    }

    #[test]
    fn test_same_seed_same_output() {
        assert_eq!(generate("ecommerce.product_name", 7), generate("ecommerce.product_name", 7));
        assert_eq!(generate("person.email", 7), generate("person.email", 7));
    }

    #[test]
    fn test_method_path_segments_are_optional() {
        // Both forms resolve to the same method; with the same seed they
        // must produce the same value.
        assert_eq!(generate("person.first_name", 3), generate("first_name", 3));
    }

    #[test]
    fn test_email_shape() {
        let Value::String(email) = generate("email", 11) else {
            panic!("expected string");
        };
        assert!(email.contains('@'));
        assert!(email.contains('.'));
    }

    #[test]
    fn test_unknown_method_is_an_error() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let result =
            CommerceProvider::new().generate("person.shoe_size", &serde_json::Map::new(), &mut rng);
        assert!(matches!(result, Err(ProviderError::UnknownMethod(_))));
    }

    #[test]
    fn test_sentence_word_count_param() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut params = serde_json::Map::new();
        params.insert("nb_words".to_string(), Value::from(3));
        let Value::String(sentence) = CommerceProvider::new()
            .generate("lorem.sentence", &params, &mut rng)
            .unwrap()
        else {
            panic!("expected string");
        };
        assert_eq!(sentence.split_whitespace().count(), 3);
        assert!(sentence.ends_with('.'));
    }
}
