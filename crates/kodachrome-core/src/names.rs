//! Human-readable nickname generation for stored policies.
//!
//! Nicknames look like `focused_turing`: an adjective and a notable
//! scientist or engineer joined by an underscore.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

/// Source of candidate nicknames. Uniqueness is checked by the caller.
pub trait NicknameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

const ADJECTIVES: &[&str] = &[
    "admiring", "adoring", "affectionate", "agitated", "amazing", "angry", "awesome",
    "beautiful", "blissful", "bold", "boring", "brave", "busy", "charming", "clever",
    "compassionate", "competent", "condescending", "confident", "cool", "cranky", "crazy",
    "dazzling", "determined", "distracted", "dreamy", "eager", "ecstatic", "elastic",
    "elated", "elegant", "eloquent", "epic", "exciting", "fervent", "festive", "flamboyant",
    "focused", "friendly", "frosty", "funny", "gallant", "gifted", "goofy", "gracious",
    "great", "happy", "hardcore", "heuristic", "hopeful", "hungry", "infallible", "inspiring",
    "intelligent", "interesting", "jolly", "jovial", "keen", "kind", "laughing", "loving",
    "lucid", "magical", "modest", "musing", "mystifying", "naughty", "nervous", "nice",
    "nifty", "nostalgic", "objective", "optimistic", "peaceful", "pedantic", "pensive",
    "practical", "priceless", "quirky", "quizzical", "recursing", "relaxed", "reverent",
    "romantic", "sad", "serene", "sharp", "silly", "sleepy", "stoic", "strange", "stupefied",
    "suspicious", "sweet", "tender", "thirsty", "trusting", "unruffled", "upbeat", "vibrant",
    "vigilant", "vigorous", "wizardly", "wonderful", "xenodochial", "youthful", "zealous",
    "zen",
];

const SURNAMES: &[&str] = &[
    "agnesi", "albattani", "allen", "almeida", "archimedes", "ardinghelli", "aryabhata",
    "babbage", "banach", "bardeen", "bartik", "bassi", "bell", "benz", "bhabha", "bhaskara",
    "blackwell", "bohr", "booth", "borg", "bose", "boyd", "brahmagupta", "brattain", "brown",
    "carson", "chandrasekhar", "clarke", "colden", "cori", "cray", "curie", "darwin",
    "davinci", "dijkstra", "dubinsky", "easley", "edison", "einstein", "elion", "engelbart",
    "euclid", "euler", "fermat", "fermi", "feynman", "franklin", "galileo", "gates", "goldberg",
    "goldstine", "goldwasser", "golick", "goodall", "hamilton", "hawking", "heisenberg",
    "hermann", "hertz", "hodgkin", "hofstadter", "hoover", "hopper", "hugle", "hypatia",
    "jackson", "jang", "jennings", "jepsen", "johnson", "joliot", "jones", "kalam", "kare",
    "keller", "kepler", "khorana", "kilby", "kirch", "knuth", "kowalevski", "lalande",
    "lamarr", "lamport", "leakey", "leavitt", "lederberg", "lehmann", "lewin", "lichterman",
    "liskov", "lovelace", "lumiere", "mahavira", "mayer", "mccarthy", "mcclintock",
    "mclean", "mcnulty", "meitner", "meninsky", "mestorf", "minsky", "mirzakhani", "morse",
    "murdock", "napier", "nash", "neumann", "newton", "nightingale", "nobel", "noether",
    "northcutt", "noyce", "panini", "pare", "pascal", "pasteur", "payne", "perlman", "pike",
    "poincare", "poitras", "ptolemy", "raman", "ramanujan", "ride", "ritchie", "roentgen",
    "rosalind", "saha", "sammet", "shannon", "shaw", "shirley", "shockley", "sinoussi",
    "snyder", "spence", "stallman", "stonebraker", "swanson", "swartz", "swirles", "tesla",
    "thompson", "torvalds", "turing", "varahamihira", "visvesvaraya", "volhard", "wescoff",
    "williams", "wilson", "wing", "wozniak", "wright", "yalow", "yonath",
];

/// Docker-style `adjective_surname` generator backed by the thread RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerStyleNames;

impl NicknameGenerator for DockerStyleNames {
    fn generate(&self) -> String {
        let mut rng = rand::rng();
        loop {
            let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
            let surname = SURNAMES[rng.random_range(0..SURNAMES.len())];
            // Steve Wozniak is not boring.
            if adjective == "boring" && surname == "wozniak" {
                continue;
            }
            return format!("{adjective}_{surname}");
        }
    }
}

/// Deterministic generator that cycles through a fixed list.
///
/// Intended for tests and for reproducing collisions.
#[derive(Debug)]
pub struct SequenceNames {
    names: Vec<String>,
    next: AtomicUsize,
}

impl SequenceNames {
    /// Panics if `names` is empty.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        assert!(!names.is_empty(), "SequenceNames needs at least one name");
        Self {
            names,
            next: AtomicUsize::new(0),
        }
    }

    /// How many names have been handed out so far.
    pub fn calls(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }
}

impl NicknameGenerator for SequenceNames {
    fn generate(&self) -> String {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        self.names[i % self.names.len()].clone()
    }
}
