/* Types the generated header never declares itself: language scalars and a
   short allow-list of standard-library names an ordinary include provides. */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Void,
    Bool,
    /* char family and 8-bit integers, the element types of raw buffers */
    Byte,
    Integral,
    Floating,
}

impl ScalarKind {
    pub fn is_byte_like(self) -> bool {
        matches!(self, ScalarKind::Byte | ScalarKind::Void)
    }

}

const BUILTINS: &[(&str, ScalarKind)] = &[
    ("void", ScalarKind::Void),
    ("bool", ScalarKind::Bool),
    ("_Bool", ScalarKind::Bool),
    ("char", ScalarKind::Byte),
    ("signed char", ScalarKind::Byte),
    ("unsigned char", ScalarKind::Byte),
    ("char8_t", ScalarKind::Byte),
    ("int8_t", ScalarKind::Byte),
    ("uint8_t", ScalarKind::Byte),
    ("wchar_t", ScalarKind::Integral),
    ("char16_t", ScalarKind::Integral),
    ("char32_t", ScalarKind::Integral),
    ("short", ScalarKind::Integral),
    ("unsigned short", ScalarKind::Integral),
    ("int", ScalarKind::Integral),
    ("unsigned int", ScalarKind::Integral),
    ("long", ScalarKind::Integral),
    ("unsigned long", ScalarKind::Integral),
    ("long long", ScalarKind::Integral),
    ("unsigned long long", ScalarKind::Integral),
    ("int16_t", ScalarKind::Integral),
    ("uint16_t", ScalarKind::Integral),
    ("int32_t", ScalarKind::Integral),
    ("uint32_t", ScalarKind::Integral),
    ("int64_t", ScalarKind::Integral),
    ("uint64_t", ScalarKind::Integral),
    ("intptr_t", ScalarKind::Integral),
    ("uintptr_t", ScalarKind::Integral),
    ("size_t", ScalarKind::Integral),
    ("ssize_t", ScalarKind::Integral),
    ("ptrdiff_t", ScalarKind::Integral),
    ("off_t", ScalarKind::Integral),
    ("float", ScalarKind::Floating),
    ("double", ScalarKind::Floating),
    ("long double", ScalarKind::Floating),
];

/* Integer types that conventionally carry an element count */
const LENGTH_TYPES: &[&str] = &[
    "size_t",
    "ssize_t",
    "unsigned short",
    "unsigned int",
    "unsigned long",
    "unsigned long long",
    "uint16_t",
    "uint32_t",
    "uint64_t",
    "uintptr_t",
];

/* POSIX scalars that neither <cstddef> nor <cstdint> provides */
const POSIX_SCALARS: &[&str] = &["ssize_t", "off_t"];

/// A standard-library type satisfied by including `include`.
#[derive(Debug, PartialEq, Eq)]
pub struct StdType {
    pub name: &'static str,
    pub include: &'static str,
    /* Passed by value like an integer; otherwise only usable behind a pointer */
    pub scalar: bool,
}

const KNOWN_STD: &[StdType] = &[
    StdType { name: "FILE", include: "<cstdio>", scalar: false },
    StdType { name: "std::FILE", include: "<cstdio>", scalar: false },
    StdType { name: "time_t", include: "<ctime>", scalar: true },
    StdType { name: "std::time_t", include: "<ctime>", scalar: true },
    StdType { name: "std::nullptr_t", include: "<cstddef>", scalar: true },
    StdType { name: "std::byte", include: "<cstddef>", scalar: true },
    StdType { name: "std::max_align_t", include: "<cstddef>", scalar: false },
    StdType { name: "va_list", include: "<cstdarg>", scalar: false },
];

/* Looks up a builtin scalar, accepting the `std::` spelling of C library names */
pub fn builtin_scalar(name: &str) -> Option<ScalarKind> {
    let name = name.trim_start_matches("::");
    let name = name.strip_prefix("std::").unwrap_or(name);
    BUILTINS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, kind)| *kind)
}

pub fn is_length_type(name: &str) -> bool {
    let name = name.trim_start_matches("::");
    let name = name.strip_prefix("std::").unwrap_or(name);
    LENGTH_TYPES.contains(&name)
}

/* Header a builtin scalar needs beyond the ones every generated header includes */
pub fn builtin_include(name: &str) -> Option<&'static str> {
    let name = name.trim_start_matches("::");
    POSIX_SCALARS.contains(&name).then_some("<sys/types.h>")
}

pub fn known_std(name: &str) -> Option<&'static StdType> {
    let name = name.trim_start_matches("::");
    KNOWN_STD.iter().find(|std_type| std_type.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_spellings_of_c_scalars_are_builtin() {
        assert_eq!(builtin_scalar("std::size_t"), Some(ScalarKind::Integral));
        assert_eq!(builtin_scalar("::uint8_t"), Some(ScalarKind::Byte));
        assert_eq!(builtin_scalar("std::string"), None);
    }

    #[test]
    fn length_types_are_unsigned_counts() {
        assert!(is_length_type("size_t"));
        assert!(is_length_type("std::size_t"));
        assert!(is_length_type("uint32_t"));
        assert!(!is_length_type("int"));
        assert!(!is_length_type("int64_t"));
    }

    #[test]
    fn posix_scalars_need_sys_types() {
        assert_eq!(builtin_include("ssize_t"), Some("<sys/types.h>"));
        assert_eq!(builtin_include("off_t"), Some("<sys/types.h>"));
        assert_eq!(builtin_include("size_t"), None);
    }

    #[test]
    fn std_byte_is_known_but_not_builtin() {
        assert_eq!(builtin_scalar("std::byte"), None);
        let byte = known_std("std::byte").unwrap();
        assert_eq!(byte.include, "<cstddef>");
        assert!(byte.scalar);
        assert!(!known_std("FILE").unwrap().scalar);
    }
}
