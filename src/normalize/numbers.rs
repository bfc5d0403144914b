//! Spoken-number to digit conversion.
//!
//! Rewrites spoken number phrases ("two thousand three hundred forty
//! five") to digit strings and ordinal words ("second") to digit+suffix
//! form. Anything that fails to parse passes through verbatim; this
//! stage never errors.

/// Replace spoken numbers and ordinals in `text` with digit forms.
pub fn convert(text: &str) -> String {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        let (core, punct) = split_trailing_punctuation(tokens[i]);
        let lower = core.to_lowercase();

        // Ordinals replace 1:1, punctuation preserved.
        if let Some(digits) = ordinal_replacement(&lower) {
            out.push(format!("{}{}", digits, punct));
            i += 1;
            continue;
        }

        if !is_number_word(&lower) {
            out.push(tokens[i].to_string());
            i += 1;
            continue;
        }

        // A number word opens a greedy run: consume consecutive
        // number-vocabulary tokens. Trailing punctuation closes the run
        // so "twenty, three" never folds across the comma.
        let start = i;
        let mut cores: Vec<String> = Vec::new();
        while i < tokens.len() {
            let (run_core, run_punct) = split_trailing_punctuation(tokens[i]);
            let run_lower = run_core.to_lowercase();
            if !is_number_word(&run_lower) {
                break;
            }
            cores.push(run_lower);
            i += 1;
            if !run_punct.is_empty() {
                break;
            }
        }

        // "and" at the edges connects to ordinary prose, not the number.
        let mut lead = 0;
        while lead < cores.len() && cores[lead] == "and" {
            lead += 1;
        }
        let mut tail = cores.len();
        while tail > lead && cores[tail - 1] == "and" {
            tail -= 1;
        }
        let run = &cores[lead..tail];

        // A bare article ("a dog") is not a number.
        let value = if run.is_empty() || (run.len() == 1 && run[0] == "a") {
            None
        } else {
            fold_run(run)
        };

        match value {
            Some(value) => {
                for token in &tokens[start..start + lead] {
                    out.push((*token).to_string());
                }
                let (_, run_punct) = split_trailing_punctuation(tokens[start + tail - 1]);
                out.push(format!("{}{}", value, run_punct));
                for token in &tokens[start + tail..i] {
                    out.push((*token).to_string());
                }
            }
            None => {
                // Fail-soft: emit the run's original tokens verbatim.
                for token in &tokens[start..i] {
                    out.push((*token).to_string());
                }
            }
        }
    }

    out.join(" ")
}

/// Fold a number-word run left to right with a two-accumulator scheme.
///
/// Ones and tens add into `partial`; "hundred" multiplies the partial;
/// a multiplier of a thousand or more folds the partial into `total`.
/// Returns `None` on an unrecognized word or arithmetic overflow.
fn fold_run(words: &[String]) -> Option<u64> {
    let mut total: u64 = 0;
    let mut partial: u64 = 0;

    for word in words {
        if let Some(v) = ones_value(word).or_else(|| tens_value(word)) {
            partial = partial.checked_add(v)?;
        } else if word == "a" {
            partial = 1;
        } else if word == "and" {
            // Pure connector: "one hundred and five".
        } else if word == "hundred" {
            let base = if partial == 0 { 1 } else { partial };
            partial = base.checked_mul(100)?;
        } else if let Some(multiplier) = large_multiplier(word) {
            let base = if partial == 0 { 1 } else { partial };
            total = total.checked_add(base.checked_mul(multiplier)?)?;
            partial = 0;
        } else {
            return None;
        }
    }

    total.checked_add(partial)
}

/// Split a token into its core and trailing punctuation.
fn split_trailing_punctuation(token: &str) -> (&str, &str) {
    let core_end = token
        .char_indices()
        .rev()
        .take_while(|(_, c)| !c.is_alphanumeric())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    token.split_at(core_end)
}

fn is_number_word(word: &str) -> bool {
    word == "a"
        || word == "and"
        || word == "hundred"
        || ones_value(word).is_some()
        || tens_value(word).is_some()
        || large_multiplier(word).is_some()
}

fn ones_value(word: &str) -> Option<u64> {
    let value = match word {
        "zero" => 0,
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        _ => return None,
    };
    Some(value)
}

fn tens_value(word: &str) -> Option<u64> {
    let value = match word {
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    };
    Some(value)
}

fn large_multiplier(word: &str) -> Option<u64> {
    let value = match word {
        "thousand" => 1_000,
        "million" => 1_000_000,
        "billion" => 1_000_000_000,
        _ => return None,
    };
    Some(value)
}

fn ordinal_replacement(word: &str) -> Option<&'static str> {
    let digits = match word {
        "first" => "1st",
        "second" => "2nd",
        "third" => "3rd",
        "fourth" => "4th",
        "fifth" => "5th",
        "sixth" => "6th",
        "seventh" => "7th",
        "eighth" => "8th",
        "ninth" => "9th",
        "tenth" => "10th",
        "eleventh" => "11th",
        "twelfth" => "12th",
        "thirteenth" => "13th",
        "fourteenth" => "14th",
        "fifteenth" => "15th",
        "sixteenth" => "16th",
        "seventeenth" => "17th",
        "eighteenth" => "18th",
        "nineteenth" => "19th",
        "twentieth" => "20th",
        "thirtieth" => "30th",
        "fortieth" => "40th",
        "fiftieth" => "50th",
        "sixtieth" => "60th",
        "seventieth" => "70th",
        "eightieth" => "80th",
        "ninetieth" => "90th",
        "hundredth" => "100th",
        "thousandth" => "1000th",
        _ => return None,
    };
    Some(digits)
}
