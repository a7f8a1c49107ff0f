use crate::Name;

from_str_header!(
    /// `Max-Forwards` header, limited to 0..=255
    MaxForwards,
    Name::MAX_FORWARDS,
    u8
);

#[cfg(test)]
mod test {
    use super::*;
    use crate::header::HeaderParse;
    use bytesstr::BytesStr;

    #[test]
    fn max_forwards() {
        let input = BytesStr::from_static("70");

        let (rem, max_fwd) = MaxForwards::parse(input.as_ref(), &input).unwrap();

        assert!(rem.is_empty());
        assert_eq!(max_fwd.0, 70);
    }

    #[test]
    fn max_forwards_out_of_range() {
        let input = BytesStr::from_static("256");

        assert!(MaxForwards::parse(input.as_ref(), &input).is_err());
    }
}
