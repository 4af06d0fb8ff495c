//! Rule-based named-entity extraction.
//!
//! Capitalised runs are pulled out of the text and classified in order:
//!
//! 1. a leading honorific or office title makes the rest of the run a `person`;
//! 2. a facility head noun (`Airport`, `Hospital`, ...) makes the whole run a `facility`;
//! 3. an organisation head or lead noun, or an all-caps acronym, makes it an `organisation`;
//! 4. otherwise the run is scanned for the longest gazetteer entries
//!    (country, city, state, nationality, religious group, political group).
//!
//! Only labels enabled in configuration are emitted.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::models::EntityMap;

static CAPITALISED_RUN: LazyLock<Regex> = LazyLock::new(|| {
    let word = r"(?:(?:Mr|Mrs|Ms|Dr|Prof|Sen|Gov|Sgt|Insp|St)\.|[A-Z][A-Za-z'&\-]*)";
    Regex::new(&format!(
        r"\b{word}(?:[ \t]+(?:(?:of|the|for|de|du)[ \t]+)?{word})*"
    ))
    .unwrap()
});

const TITLES: &[&str] = &[
    "Mr.", "Mrs.", "Ms.", "Dr.", "Prof.", "Sen.", "Gov.", "Sgt.", "Insp.", "Mr", "Mrs", "Ms",
    "Dr", "Premier", "Minister", "President", "Senator", "Mayor", "Governor", "Commissioner",
    "Chief", "Sergeant", "Inspector", "Superintendent", "Professor", "Captain", "Prime",
    "Deputy", "Treasurer", "Secretary", "Judge", "Justice", "King", "Queen", "Prince",
    "Princess", "Pope", "Bishop", "Father", "Reverend",
];

const LEADING_FILLERS: &[&str] = &[
    "The", "A", "An", "On", "In", "At", "By", "For", "From", "As", "After", "Before", "During",
    "Meanwhile", "However", "But", "And", "Residents", "Authorities", "Officials",
];

const FACILITY_HEADS: &[&str] = &[
    "Airport", "Hospital", "Bridge", "Station", "Dam", "Highway", "Motorway", "Stadium",
    "School", "Terminal", "Mine", "Tunnel", "Harbour", "Harbor", "Wharf", "Port", "Centre",
    "Center", "Prison", "Base", "Refinery", "Plant", "Freeway", "Expressway", "Railway",
    "Barracks", "Clinic", "Library", "Museum", "Mall", "Market",
];

const ORG_HEADS: &[&str] = &[
    "Agency", "Authority", "Bureau", "Council", "Department", "Ministry", "Service",
    "Services", "Corporation", "Company", "Inc", "Ltd", "Limited", "Association",
    "Commission", "Police", "Cross", "Crescent", "Organisation", "Organization", "Office",
    "Force", "Forces", "Fund", "Bank", "Union", "Institute", "Foundation", "Network",
    "Committee", "Brigade", "Brigades", "Army", "Navy", "Court", "Parliament",
];

const ORG_LEADS: &[&str] = &[
    "Bureau", "Department", "Ministry", "Office", "Commission", "University", "Bank",
    "Institute", "Board", "Court",
];

pub struct EntityExtractor {
    labels: Vec<String>,
    gazetteer: HashMap<&'static str, &'static str>,
    longest_entry: usize,
}

impl EntityExtractor {
    /// Builds an extractor that only emits the given labels.
    pub fn new(labels: &[String]) -> Self {
        let mut gazetteer = HashMap::new();
        for (label, entries) in GAZETTEER {
            for entry in *entries {
                gazetteer.insert(*entry, *label);
            }
        }
        let longest_entry = gazetteer
            .keys()
            .map(|k| k.split_whitespace().count())
            .max()
            .unwrap_or(1);

        Self {
            labels: labels.to_vec(),
            gazetteer,
            longest_entry,
        }
    }

    fn enabled(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    fn emit(&self, map: &mut EntityMap, label: &str, surface: &str) {
        if self.enabled(label) && !surface.is_empty() {
            map.insert(label, surface);
        }
    }

    /// Extracts entities from `text`. Returns `None` when nothing was found.
    pub fn extract(&self, text: &str) -> Option<EntityMap> {
        let mut map = EntityMap::new();

        for m in CAPITALISED_RUN.find_iter(text) {
            let mut words: Vec<&str> = m.as_str().split_whitespace().collect();
            while words.len() > 1 && LEADING_FILLERS.contains(&words[0]) {
                words.remove(0);
            }
            if words.is_empty() || (words.len() == 1 && LEADING_FILLERS.contains(&words[0])) {
                continue;
            }
            self.classify_run(&words, &mut map);
        }

        if map.is_empty() {
            None
        } else {
            Some(map)
        }
    }

    fn classify_run(&self, words: &[&str], map: &mut EntityMap) {
        let titles = words.iter().take_while(|w| TITLES.contains(*w)).count();
        if titles > 0 {
            let rest = &words[titles..];
            // "Prime Minister" style titles continue with another title word
            let name: Vec<&str> = rest
                .iter()
                .copied()
                .skip_while(|w| *w == "Minister" || *w == "General")
                .take(3)
                .collect();
            if !name.is_empty() {
                self.emit(map, "person", &name.join(" "));
            }
            return;
        }

        let phrase = words.join(" ");
        let first = words[0];
        let last = words[words.len() - 1];

        if words.len() > 1 && FACILITY_HEADS.contains(&last) {
            self.emit(map, "facility", &phrase);
            return;
        }

        let is_acronym = words.len() == 1
            && (2..=6).contains(&first.len())
            && first.chars().all(|c| c.is_ascii_uppercase())
            && !self.gazetteer.contains_key(first);
        if (words.len() > 1 && (ORG_HEADS.contains(&last) || ORG_LEADS.contains(&first)))
            || is_acronym
        {
            self.emit(map, "organisation", &phrase);
            return;
        }

        self.scan_gazetteer(words, map);
    }

    fn scan_gazetteer(&self, words: &[&str], map: &mut EntityMap) {
        let mut i = 0;
        while i < words.len() {
            let max_len = self.longest_entry.min(words.len() - i);
            let hit = (1..=max_len).rev().find_map(|len| {
                let candidate = words[i..i + len].join(" ");
                self.gazetteer
                    .get(candidate.as_str())
                    .map(|label| (len, candidate, *label))
            });
            match hit {
                Some((len, surface, label)) => {
                    self.emit(map, label, &surface);
                    i += len;
                }
                None => i += 1,
            }
        }
    }
}

const GAZETTEER: &[(&str, &[&str])] = &[
    (
        "country",
        &[
            "Australia", "Papua New Guinea", "Indonesia", "Philippines", "New Zealand", "Fiji",
            "Vanuatu", "Solomon Islands", "Samoa", "Tonga", "Timor-Leste", "East Timor",
            "Malaysia", "Singapore", "Thailand", "Vietnam", "Cambodia", "Laos", "Myanmar",
            "Bangladesh", "India", "Pakistan", "Sri Lanka", "Nepal", "China", "Taiwan", "Japan",
            "South Korea", "North Korea", "Mongolia", "United States", "USA", "Canada", "Mexico",
            "Brazil", "Argentina", "Chile", "Peru", "Colombia", "United Kingdom", "Britain",
            "England", "Scotland", "Ireland", "France", "Germany", "Italy", "Spain", "Portugal",
            "Greece", "Turkey", "Ukraine", "Russia", "Poland", "Israel", "Iran", "Iraq", "Syria",
            "Lebanon", "Egypt", "Libya", "Sudan", "Ethiopia", "Kenya", "Nigeria", "South Africa",
            "Morocco", "Afghanistan", "Saudi Arabia", "Yemen",
        ],
    ),
    (
        "city",
        &[
            "Sydney", "Melbourne", "Brisbane", "Perth", "Adelaide", "Darwin", "Hobart",
            "Canberra", "Cairns", "Townsville", "Newcastle", "Wollongong", "Geelong",
            "Gold Coast", "Lismore", "Auckland", "Wellington", "Christchurch", "Jakarta",
            "Surabaya", "Bali", "Denpasar", "Manila", "Cebu", "Port Moresby", "Lae", "Suva",
            "Nadi", "Honiara", "Port Vila", "Apia", "Dili", "Kuala Lumpur", "Bangkok", "Hanoi",
            "Ho Chi Minh City", "Yangon", "Dhaka", "Delhi", "New Delhi", "Mumbai", "Kolkata",
            "Chennai", "Karachi", "Lahore", "Kathmandu", "Beijing", "Shanghai", "Hong Kong",
            "Taipei", "Tokyo", "Osaka", "Seoul", "London", "Paris", "Berlin", "Rome", "Madrid",
            "Athens", "Istanbul", "Kyiv", "Moscow", "New York", "Los Angeles", "San Francisco",
            "Chicago", "Houston", "Miami", "Washington", "Toronto", "Vancouver", "Mexico City",
            "Cairo", "Nairobi", "Lagos", "Johannesburg", "Dubai", "Tehran", "Baghdad", "Kabul",
        ],
    ),
    (
        "state",
        &[
            "New South Wales", "NSW", "Victoria", "Queensland", "Tasmania", "Western Australia",
            "South Australia", "Northern Territory", "Australian Capital Territory", "ACT",
            "California", "Texas", "Florida", "Oregon", "Hawaii", "Alaska", "Louisiana",
            "Ontario", "Quebec", "British Columbia", "Java", "Sumatra", "Sulawesi", "Papua",
            "Mindanao", "Luzon", "Kerala", "Assam", "Punjab", "Bihar", "Gujarat",
        ],
    ),
    (
        "nationality",
        &[
            "Australian", "Australians", "Indonesian", "Indonesians", "Filipino", "Filipinos",
            "New Zealander", "New Zealanders", "Fijian", "Papua New Guinean", "Malaysian",
            "Thai", "Vietnamese", "Indian", "Indians", "Pakistani", "Bangladeshi", "Chinese",
            "Japanese", "Korean", "American", "Americans", "Canadian", "British", "English",
            "Irish", "French", "German", "Italian", "Spanish", "Greek", "Turkish", "Ukrainian",
            "Russian", "Israeli", "Palestinian", "Iranian", "Iraqi", "Syrian", "Egyptian",
            "Kenyan", "Nigerian", "Afghan",
        ],
    ),
    (
        "religious group",
        &[
            "Christian", "Christians", "Catholic", "Catholics", "Anglican", "Anglicans",
            "Protestant", "Protestants", "Muslim", "Muslims", "Islamic", "Sunni", "Shia",
            "Buddhist", "Buddhists", "Hindu", "Hindus", "Jewish", "Jews", "Sikh", "Sikhs",
        ],
    ),
    (
        "political group",
        &[
            "Labor", "Labour", "Liberals", "Liberal Party", "Labor Party", "Labour Party",
            "Nationals", "Greens", "One Nation", "Democrats", "Republicans", "Democratic Party",
            "Republican Party", "Conservatives", "Conservative Party", "Communist Party",
            "Taliban", "Hamas", "Hezbollah",
        ],
    ),
];
