use crate::Name;

from_str_header!(
    /// `Expires` header
    Expires,
    Name::EXPIRES,
    u32
);
