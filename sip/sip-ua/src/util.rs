use bytesstr::BytesStr;
use rand::distr::Alphanumeric;
use rand::Rng;

/// 16 characters of `[0-9A-Za-z]`, used for tags and call-ids
pub(crate) fn random_string() -> BytesStr {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(16)
        .map(char::from)
        .collect::<String>()
        .into()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn random_string_alphabet() {
        let s = random_string();

        assert_eq!(s.len(), 16);
        assert!(s.bytes().all(|b| b.is_ascii_alphanumeric()));
    }
}
