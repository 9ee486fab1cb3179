use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Unexpected, Visitor},
};
use std::{fmt, marker::PhantomData};

/// Closed-set enums that travel as lowercase strings.
///
/// `TABLE` maps each variant to its wire string and numeric value. Reads
/// accept either form, writes always emit the string.
pub trait WireEnum: Copy + PartialEq + Sized + 'static {
    const TABLE: &'static [(Self, &'static str, i64)];

    fn as_wire_str(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(variant, _, _)| *variant == self)
            .map(|(_, name, _)| *name)
            .unwrap_or_default()
    }

    fn from_wire_str(name: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(_, wire, _)| *wire == name)
            .map(|(variant, _, _)| *variant)
    }

    fn from_wire_number(number: i64) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(_, _, wire)| *wire == number)
            .map(|(variant, _, _)| *variant)
    }
}

pub fn serialize_wire<T: WireEnum, S: Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_wire_str())
}

pub fn deserialize_wire<'de, T: WireEnum, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<T, D::Error> {
    deserializer.deserialize_any(WireVisitor(PhantomData))
}

struct WireVisitor<T>(PhantomData<T>);

impl<T: WireEnum> Visitor<'_> for WireVisitor<T> {
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<&str> = T::TABLE.iter().map(|(_, name, _)| *name).collect();
        write!(f, "one of {names:?} or its numeric value")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<T, E> {
        T::from_wire_str(v).ok_or_else(|| E::invalid_value(Unexpected::Str(v), &self))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<T, E> {
        T::from_wire_number(v).ok_or_else(|| E::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<T, E> {
        i64::try_from(v)
            .ok()
            .and_then(T::from_wire_number)
            .ok_or_else(|| E::invalid_value(Unexpected::Unsigned(v), &self))
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChatMessageRole {
    System,
    User,
    Assistant,
}

impl WireEnum for ChatMessageRole {
    const TABLE: &'static [(Self, &'static str, i64)] = &[
        (Self::System, "system", 0),
        (Self::User, "user", 1),
        (Self::Assistant, "assistant", 2),
    ];
}

impl Serialize for ChatMessageRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_wire(self, serializer)
    }
}

impl<'de> Deserialize<'de> for ChatMessageRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_wire(deserializer)
    }
}

impl fmt::Display for ChatMessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire_str())
    }
}
