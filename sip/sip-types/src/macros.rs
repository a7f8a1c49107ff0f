macro_rules! lookup_table {
    ($c:ident => alpha; num; $($chars:literal),+ $(,)?) => {
        $c.is_ascii_alphanumeric() || matches!($c, $($chars)|+)
    };
    ($c:ident => alpha; num) => {
        $c.is_ascii_alphanumeric()
    };
}

macro_rules! encode_set {
    ($fn:ident, $name:ident) => {
        lazy_static::lazy_static! {
            static ref $name: AsciiSet = {
                let mut set = percent_encoding::CONTROLS.add(0);

                for b in 0..=127u8 {
                    if !$fn(b as char) {
                        set = set.add(b);
                    }
                }

                set
            };
        }
    };
}

/// Implements a header type which wraps another parse/print-able type,
/// assigning it a name and list behavior (`Single` headers replace their
/// value on insert, `CSV` headers append comma-separated).
macro_rules! impl_wrap_header {
    ($(#[$meta:meta])* $wrapped:ty, $name:ident, $kind:ident, $header_name:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(pub $wrapped);

        impl std::ops::Deref for $name {
            type Target = $wrapped;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }

        impl $crate::header::ConstNamed for $name {
            const NAME: $crate::Name = $header_name;
        }

        impl $crate::header::HeaderParse for $name {
            fn parse<'i>(
                src: &'i $crate::_private_reexport::Bytes,
                i: &'i str,
            ) -> $crate::_private_reexport::IResult<&'i str, Self> {
                $crate::_private_reexport::nom::combinator::map(<$wrapped>::parse(src), Self)(i)
            }
        }

        impl_wrap_header!(@extend $kind, $name);

        impl $crate::print::Print for $name {
            fn print(
                &self,
                f: &mut std::fmt::Formatter<'_>,
                ctx: $crate::print::PrintCtx<'_>,
            ) -> std::fmt::Result {
                self.0.print(f, ctx)
            }
        }
    };
    (@extend Single, $name:ident) => {
        impl $crate::header::ExtendValues for $name {
            fn extend_values(
                &self,
                ctx: $crate::print::PrintCtx<'_>,
                values: &mut $crate::header::headers::OneOrMore,
            ) {
                *values = self.create_values(ctx)
            }

            fn create_values(
                &self,
                ctx: $crate::print::PrintCtx<'_>,
            ) -> $crate::header::headers::OneOrMore {
                use $crate::print::AppendCtx;

                $crate::header::headers::OneOrMore::One(self.print_ctx(ctx).to_string().into())
            }
        }
    };
    (@extend CSV, $name:ident) => {
        impl $crate::header::ExtendValues for $name {
            fn extend_values(
                &self,
                ctx: $crate::print::PrintCtx<'_>,
                values: &mut $crate::header::headers::OneOrMore,
            ) {
                use $crate::print::AppendCtx;

                let value = match values {
                    $crate::header::headers::OneOrMore::One(value) => value,
                    $crate::header::headers::OneOrMore::More(values) => {
                        values.last_mut().expect("empty OneOrMore::More variant")
                    }
                };

                *value = format!("{}, {}", value, self.print_ctx(ctx)).into();
            }

            fn create_values(
                &self,
                ctx: $crate::print::PrintCtx<'_>,
            ) -> $crate::header::headers::OneOrMore {
                use $crate::print::AppendCtx;

                $crate::header::headers::OneOrMore::One(self.print_ctx(ctx).to_string().into())
            }
        }
    };
}

/// Implements a header holding a single value that can be parsed from and
/// printed via its `FromStr`/`Display` implementations.
macro_rules! from_str_header {
    ($(#[$meta:meta])* $struct_name:ident, $header_name:expr, $from_str_ty:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $struct_name(pub $from_str_ty);

        impl $crate::header::ConstNamed for $struct_name {
            const NAME: $crate::Name = $header_name;
        }

        impl $crate::header::HeaderParse for $struct_name {
            fn parse<'i>(
                _: &'i $crate::_private_reexport::Bytes,
                i: &'i str,
            ) -> $crate::_private_reexport::IResult<&'i str, Self> {
                match i.trim().parse() {
                    Ok(value) => Ok(("", Self(value))),
                    Err(e) => Err($crate::_private_reexport::nom::Err::Failure(
                        $crate::_private_reexport::ParseError::from(
                            $crate::_private_reexport::anyhow::Error::new(e),
                        ),
                    )),
                }
            }
        }

        impl $crate::header::ExtendValues for $struct_name {
            fn extend_values(
                &self,
                ctx: $crate::print::PrintCtx<'_>,
                values: &mut $crate::header::headers::OneOrMore,
            ) {
                *values = self.create_values(ctx)
            }

            fn create_values(
                &self,
                _: $crate::print::PrintCtx<'_>,
            ) -> $crate::header::headers::OneOrMore {
                $crate::header::headers::OneOrMore::One(self.0.to_string().into())
            }
        }
    };
}
