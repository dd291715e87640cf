//! Lexical constants for the triage feature extractor.
//!
//! Ten keyword buckets (one per intent class, in class order) plus the
//! location/time cue lists. Bucket phrases are matched as substrings of the
//! normalized text; time words require a whole-token match. These tables are
//! produced together with the decision trees by the offline trainer and must
//! stay in sync with them.

pub(crate) const LOCATION_CUES: &[&str] = &["near", "at", "by", "behind", "next to", "coords", "gps", "location"];

pub(crate) const PLACE_TOKENS: &[&str] = &["library", "bridge", "camp", "market", "hospital", "school"];

pub(crate) const TIME_WORDS: &[&str] = &["now", "asap", "urgent", "tonight", "immediately", "right away", "soon", "quick"];

pub(crate) const LOCATION_WORDS: &[&str] = &[
    "at", "near", "behind", "by", "next to", "around", "in", "gps", "coords", "coordinate", "location", "library", "bridge", "camp", "market", "hospital",
    "school",
];

const MEDIC_WORDS: &[&str] = &[
    "medic",
    "doctor",
    "injured",
    "bleed",
    "bleeding",
    "unconscious",
    "hurt",
    "wounded",
    "ambulance",
    "pain",
    "trauma",
    "emergency",
    "critical",
    "wound",
    "wounds",
    "fracture",
    "broken bone",
    "stabilize",
    "first aid",
    "paramedic",
    "nurse",
    "hospital",
    "bleeding out",
    "hemorrhage",
    "concussion",
    "laceration",
    "stitches",
    "cardiac",
    "cpr",
    "resuscitate",
    "collapse",
    "unresponsive",
    "casualty",
    "casualties",
    "not talking",
];

const WATER_WORDS: &[&str] = &[
    "water",
    "thirsty",
    "dehydration",
    "bottle",
    "well",
    "hydration",
    "drink",
    "drinking",
    "dry",
    "clean water",
    "potable",
    "running out of water",
    "no water",
    "water supply",
    "thirst",
    "parched",
    "reservoir",
    "purify",
    "filter",
    "cistern",
    "faucet",
    "running water",
];

const FOOD_WORDS: &[&str] = &[
    "food",
    "hungry",
    "ration",
    "rice",
    "bread",
    "meal",
    "starving",
    "rations",
    "supplies",
    "feed",
    "feeding",
    "malnutrition",
    "famine",
    "provisions",
    "groceries",
    "eat",
    "eating",
    "kitchen",
    "cook",
    "cooking",
    "starvation",
    "no food",
    "out of food",
    "need food",
    "run out",
];

const SHELTER_WORDS: &[&str] = &[
    "shelter",
    "tent",
    "roof",
    "cold",
    "sleep",
    "blanket",
    "safehouse",
    "housing",
    "warm",
    "warmth",
    "indoors",
    "building",
    "refuge",
    "camp",
    "campsite",
    "bed",
    "sleeping",
    "freezing",
    "hypothermia",
    "frostbite",
    "nowhere to stay",
    "homeless",
    "evicted",
];

const DANGER_WORDS: &[&str] = &[
    "gun",
    "shooting",
    "shots",
    "explosion",
    "attack",
    "fire",
    "bomb",
    "sniper",
    "danger",
    "gunfire",
    "armed",
    "weapon",
    "weapons",
    "violence",
    "hostile",
    "strike",
    "striking",
    "explosive",
    "blast",
    "IED",
    "grenade",
    "ambush",
    "raid",
    "invasion",
    "threat",
    "threatened",
];

const EVAC_WORDS: &[&str] = &[
    "evacuate",
    "leave",
    "run",
    "escape",
    "exit",
    "safe route",
    "move out",
    "relocate",
    "evacuation",
    "evac",
    "get out",
    "flee",
    "fleeing",
    "exodus",
    "withdraw",
    "pull out",
    "route out",
    "safe path",
    "clear path",
    "extract",
    "extraction",
    "rescue",
    "evacuees",
];

const INFO_WORDS: &[&str] = &[
    "where",
    "when",
    "status",
    "update",
    "check-in",
    "anyone",
    "need info",
    "what's up",
    "whats up",
    "news",
    "situation",
    "report",
    "intel",
    "intelligence",
    "briefing",
    "sitrep",
    "location of",
    "anyone know",
    "heard",
    "rumor",
    "confirmed",
    "unconfirmed",
    "latest",
    "current",
];

const DISASTER_WORDS: &[&str] = &[
    "flood",
    "flooding",
    "flooded",
    "water everywhere",
    "earthquake",
    "quake",
    "tsunami",
    "landslide",
    "hurricane",
    "tornado",
    "storm",
    "disaster",
    "natural disaster",
    "wildfire",
    "mudslide",
    "avalanche",
    "cyclone",
    "typhoon",
    "drought",
    "blizzard",
    "hail",
    "building collapse",
    "collapsed",
    "washed away",
    "inundated",
    "submerged",
    "trapped",
];

const SICKNESS_WORDS: &[&str] = &[
    "sick",
    "illness",
    "ill",
    "fever",
    "cough",
    "virus",
    "disease",
    "vomiting",
    "diarrhea",
    "symptoms",
    "infection",
    "infected",
    "contagious",
    "outbreak",
    "epidemic",
    "pandemic",
    "nausea",
    "dizzy",
    "weak",
    "can't breathe",
    "shortness of breath",
    "chest pain",
    "allergic",
    "allergy",
    "reaction",
    "poisoning",
    "food poisoning",
    "dehydrated",
];

const CHAT_WORDS: &[&str] = &[
    "lol", "ok", "okay", "thanks", "thank you", "see you", "brb", "hi", "hello", "good", "nice", "hey", "yeah", "yep", "nope", "sure", "cool", "great", "fine",
    "bye", "later", "got it", "understood", "copy", "roger", "check", "alright", "whatever", "k",
];

/// Keyword buckets in intent-class order.
pub(crate) const BUCKETS: [&[&str]; 10] = [
    MEDIC_WORDS,
    WATER_WORDS,
    FOOD_WORDS,
    SHELTER_WORDS,
    DANGER_WORDS,
    EVAC_WORDS,
    INFO_WORDS,
    DISASTER_WORDS,
    SICKNESS_WORDS,
    CHAT_WORDS,
];
