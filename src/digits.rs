/// Group the digits of recognized text into blocks of four.
///
/// Non-digit characters are dropped entirely; the remaining digits keep their
/// left-to-right order and are joined in runs of up to four, separated by a
/// single space. Input without digits yields an empty string.
///
/// This is lossy by design: the transform only makes sense when the expected
/// payload is a digit sequence, such as a card number spoken aloud.
pub fn group_digits(text: &str) -> String {
    let digits: Vec<char> = text.chars().filter(|c| c.is_ascii_digit()).collect();

    digits
        .chunks(4)
        .map(|run| run.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(group_digits(""), "");
    }

    #[test]
    fn digit_free_input_yields_empty_output() {
        assert_eq!(group_digits("abc"), "");
    }

    #[test]
    fn groups_of_four() {
        assert_eq!(group_digits("12345678"), "1234 5678");
    }

    #[test]
    fn non_digits_are_dropped_order_kept() {
        assert_eq!(group_digits("a1b22c333"), "1223 33");
    }

    #[test]
    fn card_number_with_spaces() {
        assert_eq!(group_digits("9860 12 345678 9012"), "9860 1234 5678 9012");
    }

    #[test]
    fn trailing_partial_group() {
        assert_eq!(group_digits("12345"), "1234 5");
    }
}
