//! Kokoro voice table.
//!
//! Voice ids in the reader's pool are Kokoro voice names when the Kokoro backend
//! is selected; this maps them to the model's speaker ids.

/// Metadata for one Kokoro voice.
#[derive(Debug, Clone, Copy)]
pub struct Voice {
    pub speaker_id: i32,
    pub espeak_code: &'static str,
    pub language: &'static str,
}

/// Sorted by name for binary search.
const VOICES: &[(&str, Voice)] = &[
    ("af_alloy", Voice { speaker_id: 0, espeak_code: "en-us", language: "American English" }),
    ("af_aoede", Voice { speaker_id: 1, espeak_code: "en-us", language: "American English" }),
    ("af_bella", Voice { speaker_id: 2, espeak_code: "en-us", language: "American English" }),
    ("af_heart", Voice { speaker_id: 3, espeak_code: "en-us", language: "American English" }),
    ("af_jessica", Voice { speaker_id: 4, espeak_code: "en-us", language: "American English" }),
    ("af_kore", Voice { speaker_id: 5, espeak_code: "en-us", language: "American English" }),
    ("af_nicole", Voice { speaker_id: 6, espeak_code: "en-us", language: "American English" }),
    ("af_nova", Voice { speaker_id: 7, espeak_code: "en-us", language: "American English" }),
    ("af_river", Voice { speaker_id: 8, espeak_code: "en-us", language: "American English" }),
    ("af_sarah", Voice { speaker_id: 9, espeak_code: "en-us", language: "American English" }),
    ("af_sky", Voice { speaker_id: 10, espeak_code: "en-us", language: "American English" }),
    ("am_adam", Voice { speaker_id: 11, espeak_code: "en-us", language: "American English" }),
    ("am_echo", Voice { speaker_id: 12, espeak_code: "en-us", language: "American English" }),
    ("am_eric", Voice { speaker_id: 13, espeak_code: "en-us", language: "American English" }),
    ("am_fenrir", Voice { speaker_id: 14, espeak_code: "en-us", language: "American English" }),
    ("am_liam", Voice { speaker_id: 15, espeak_code: "en-us", language: "American English" }),
    ("am_michael", Voice { speaker_id: 16, espeak_code: "en-us", language: "American English" }),
    ("am_onyx", Voice { speaker_id: 17, espeak_code: "en-us", language: "American English" }),
    ("am_puck", Voice { speaker_id: 18, espeak_code: "en-us", language: "American English" }),
    ("am_santa", Voice { speaker_id: 19, espeak_code: "en-us", language: "American English" }),
    ("bf_alice", Voice { speaker_id: 20, espeak_code: "en-gb", language: "British English" }),
    ("bf_emma", Voice { speaker_id: 21, espeak_code: "en-gb", language: "British English" }),
    ("bf_isabella", Voice { speaker_id: 22, espeak_code: "en-gb", language: "British English" }),
    ("bf_lily", Voice { speaker_id: 23, espeak_code: "en-gb", language: "British English" }),
    ("bm_daniel", Voice { speaker_id: 24, espeak_code: "en-gb", language: "British English" }),
    ("bm_fable", Voice { speaker_id: 25, espeak_code: "en-gb", language: "British English" }),
    ("bm_george", Voice { speaker_id: 26, espeak_code: "en-gb", language: "British English" }),
    ("bm_lewis", Voice { speaker_id: 27, espeak_code: "en-gb", language: "British English" }),
    ("ef_dora", Voice { speaker_id: 28, espeak_code: "es", language: "Spanish" }),
    ("em_alex", Voice { speaker_id: 29, espeak_code: "es", language: "Spanish" }),
    ("ff_siwis", Voice { speaker_id: 30, espeak_code: "fr-fr", language: "French" }),
    ("hf_alpha", Voice { speaker_id: 31, espeak_code: "hi", language: "Hindi" }),
    ("hf_beta", Voice { speaker_id: 32, espeak_code: "hi", language: "Hindi" }),
    ("hm_omega", Voice { speaker_id: 33, espeak_code: "hi", language: "Hindi" }),
    ("hm_psi", Voice { speaker_id: 34, espeak_code: "hi", language: "Hindi" }),
    ("if_sara", Voice { speaker_id: 35, espeak_code: "it", language: "Italian" }),
    ("im_nicola", Voice { speaker_id: 36, espeak_code: "it", language: "Italian" }),
    ("jf_alpha", Voice { speaker_id: 37, espeak_code: "ja", language: "Japanese" }),
    ("jf_gongitsune", Voice { speaker_id: 38, espeak_code: "ja", language: "Japanese" }),
    ("jf_nezumi", Voice { speaker_id: 39, espeak_code: "ja", language: "Japanese" }),
    ("jf_tebukuro", Voice { speaker_id: 40, espeak_code: "ja", language: "Japanese" }),
    ("jm_kumo", Voice { speaker_id: 41, espeak_code: "ja", language: "Japanese" }),
    ("pf_dora", Voice { speaker_id: 42, espeak_code: "pt-br", language: "Portuguese BR" }),
    ("pm_alex", Voice { speaker_id: 43, espeak_code: "pt-br", language: "Portuguese BR" }),
    ("pm_santa", Voice { speaker_id: 44, espeak_code: "pt-br", language: "Portuguese BR" }),
    ("zf_xiaobei", Voice { speaker_id: 45, espeak_code: "cmn", language: "Mandarin Chinese" }),
    ("zf_xiaoni", Voice { speaker_id: 46, espeak_code: "cmn", language: "Mandarin Chinese" }),
    ("zf_xiaoxiao", Voice { speaker_id: 47, espeak_code: "cmn", language: "Mandarin Chinese" }),
    ("zf_xiaoyi", Voice { speaker_id: 48, espeak_code: "cmn", language: "Mandarin Chinese" }),
    ("zm_yunjian", Voice { speaker_id: 49, espeak_code: "cmn", language: "Mandarin Chinese" }),
    ("zm_yunxi", Voice { speaker_id: 50, espeak_code: "cmn", language: "Mandarin Chinese" }),
    ("zm_yunxia", Voice { speaker_id: 51, espeak_code: "cmn", language: "Mandarin Chinese" }),
    ("zm_yunyang", Voice { speaker_id: 52, espeak_code: "cmn", language: "Mandarin Chinese" }),
];

/// Look up a voice by name.
pub fn get_voice(name: &str) -> Option<&'static Voice> {
    VOICES.binary_search_by_key(&name, |(n, _)| n).ok().map(|idx| &VOICES[idx].1)
}

/// All voice names, in table order.
pub fn names() -> impl Iterator<Item = &'static str> {
    VOICES.iter().map(|(name, _)| *name)
}

/// Print the voice table grouped by language.
pub fn print_voices() {
    let mut languages: Vec<&str> = Vec::new();
    for (_, voice) in VOICES {
        if !languages.contains(&voice.language) {
            languages.push(voice.language);
        }
    }

    println!("Kokoro voices ({} total)", VOICES.len());
    for language in languages {
        println!("\n── {} ──", language);
        println!("{:<15} {:<4} ESPEAK", "VOICE", "ID");
        for (name, voice) in VOICES.iter().filter(|(_, v)| v.language == language) {
            println!("{:<15} {:<4} {}", name, voice.speaker_id, voice.espeak_code);
        }
    }

    println!();
    println!("Usage:");
    println!("  voice-reader --backend kokoro --voices af_heart,bf_emma,am_adam --default-voice af_bella");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted_for_lookup() {
        let names: Vec<&str> = names().collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_lookup() {
        assert_eq!(get_voice("bf_emma").map(|v| v.speaker_id), Some(21));
        assert!(get_voice("mei_normal").is_none());
    }
}
