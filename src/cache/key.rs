//! Deterministic cache key derivation
//!
//! A cache key has the form `{prefix}/{handler}:{hex digest}` where the digest
//! is taken over a canonical rendering of the namespace token and the call
//! arguments. Every argument type contributes to that rendering through the
//! [`KeyPart`] trait; there is no reflection over runtime types.
//!
//! The canonical rendering frames every component as `{byte length}:{text}`,
//! so no choice of argument values can make two different calls concatenate
//! to the same bytes.

use crate::cache::{hash::HashFunction, types::CacheKey};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::BuildHasher;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::Arc;

/// Name prefix marking a named argument as per-call context
pub const RESERVED_CONTEXT_PREFIX: &str = "__";

/// Qualified name of a handler, `module::path::name`
#[macro_export]
macro_rules! handler_identity {
    ($name:ident) => {
        concat!(module_path!(), "::", stringify!($name))
    };
}

fn push_framed(out: &mut String, text: &str) {
    out.push_str(&text.len().to_string());
    out.push(':');
    out.push_str(text);
}

fn push_scalar(out: &mut String, tag: char, text: &str) {
    out.push(tag);
    push_framed(out, text);
}

/// Contribution of a value to a cache key
///
/// Implementations append a canonical, self-delimiting rendering of the value.
/// Two values that should share a cache entry must render identically; values
/// that should not must render differently.
pub trait KeyPart {
    /// Append the canonical rendering of `self`
    fn write_key_part(&self, out: &mut String);

    /// Whether this value is per-call context (request, response, connection
    /// handles, ...) carrying no meaning for the cached result
    fn is_call_context(&self) -> bool {
        false
    }
}

/// Canonical rendering of a single value
pub fn key_repr<T: KeyPart + ?Sized>(value: &T) -> String {
    let mut out = String::new();
    value.write_key_part(&mut out);
    out
}

impl KeyPart for str {
    fn write_key_part(&self, out: &mut String) {
        push_scalar(out, 's', self);
    }
}

impl KeyPart for String {
    fn write_key_part(&self, out: &mut String) {
        self.as_str().write_key_part(out);
    }
}

impl KeyPart for char {
    fn write_key_part(&self, out: &mut String) {
        let mut buf = [0u8; 4];
        push_scalar(out, 'c', self.encode_utf8(&mut buf));
    }
}

impl KeyPart for bool {
    fn write_key_part(&self, out: &mut String) {
        out.push_str(if *self { "b1" } else { "b0" });
    }
}

impl KeyPart for () {
    fn write_key_part(&self, out: &mut String) {
        out.push('u');
    }
}

// Integers of every width share one tag: `1u8` and `1i64` are the same argument.
macro_rules! impl_key_part_integer {
    ($($ty:ty),*) => {
        $(
            impl KeyPart for $ty {
                fn write_key_part(&self, out: &mut String) {
                    push_scalar(out, 'i', &self.to_string());
                }
            }
        )*
    };
}

impl_key_part_integer!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl KeyPart for f32 {
    fn write_key_part(&self, out: &mut String) {
        push_scalar(out, 'f', &format!("{:?}", self));
    }
}

impl KeyPart for f64 {
    fn write_key_part(&self, out: &mut String) {
        push_scalar(out, 'f', &format!("{:?}", self));
    }
}

impl<T: KeyPart + ?Sized> KeyPart for &T {
    fn write_key_part(&self, out: &mut String) {
        (**self).write_key_part(out);
    }

    fn is_call_context(&self) -> bool {
        (**self).is_call_context()
    }
}

impl<T: KeyPart + ?Sized> KeyPart for Box<T> {
    fn write_key_part(&self, out: &mut String) {
        (**self).write_key_part(out);
    }

    fn is_call_context(&self) -> bool {
        (**self).is_call_context()
    }
}

impl<T: KeyPart + ?Sized> KeyPart for Arc<T> {
    fn write_key_part(&self, out: &mut String) {
        (**self).write_key_part(out);
    }

    fn is_call_context(&self) -> bool {
        (**self).is_call_context()
    }
}

impl<T: KeyPart + ?Sized> KeyPart for Rc<T> {
    fn write_key_part(&self, out: &mut String) {
        (**self).write_key_part(out);
    }

    fn is_call_context(&self) -> bool {
        (**self).is_call_context()
    }
}

impl<T: KeyPart> KeyPart for Option<T> {
    fn write_key_part(&self, out: &mut String) {
        match self {
            Some(value) => {
                out.push_str("o(");
                value.write_key_part(out);
                out.push(')');
            }
            None => out.push('n'),
        }
    }
}

fn write_sequence<'a, T, I>(out: &mut String, tag: char, items: I)
where
    T: KeyPart + 'a,
    I: ExactSizeIterator<Item = &'a T>,
{
    out.push(tag);
    out.push_str(&items.len().to_string());
    out.push('[');
    for item in items {
        item.write_key_part(out);
    }
    out.push(']');
}

// Unordered collections render their elements in sorted canonical order.
fn write_sorted(out: &mut String, tag: char, mut reprs: Vec<String>) {
    reprs.sort();
    out.push(tag);
    out.push_str(&reprs.len().to_string());
    out.push('[');
    for repr in reprs {
        out.push_str(&repr);
    }
    out.push(']');
}

impl<T: KeyPart> KeyPart for [T] {
    fn write_key_part(&self, out: &mut String) {
        write_sequence(out, 'l', self.iter());
    }
}

impl<T: KeyPart, const N: usize> KeyPart for [T; N] {
    fn write_key_part(&self, out: &mut String) {
        write_sequence(out, 'l', self.iter());
    }
}

impl<T: KeyPart> KeyPart for Vec<T> {
    fn write_key_part(&self, out: &mut String) {
        write_sequence(out, 'l', self.iter());
    }
}

impl<T: KeyPart> KeyPart for BTreeSet<T> {
    fn write_key_part(&self, out: &mut String) {
        write_sorted(out, 'e', self.iter().map(key_repr).collect());
    }
}

impl<T: KeyPart, S: BuildHasher> KeyPart for HashSet<T, S> {
    fn write_key_part(&self, out: &mut String) {
        write_sorted(out, 'e', self.iter().map(key_repr).collect());
    }
}

fn entry_repr<K: KeyPart, V: KeyPart>(key: &K, value: &V) -> String {
    let mut out = key_repr(key);
    value.write_key_part(&mut out);
    out
}

impl<K: KeyPart, V: KeyPart> KeyPart for BTreeMap<K, V> {
    fn write_key_part(&self, out: &mut String) {
        write_sorted(out, 'm', self.iter().map(|(k, v)| entry_repr(k, v)).collect());
    }
}

impl<K: KeyPart, V: KeyPart, S: BuildHasher> KeyPart for HashMap<K, V, S> {
    fn write_key_part(&self, out: &mut String) {
        write_sorted(out, 'm', self.iter().map(|(k, v)| entry_repr(k, v)).collect());
    }
}

macro_rules! impl_key_part_tuple {
    ($len:literal => $($name:ident $idx:tt),+) => {
        impl<$($name: KeyPart),+> KeyPart for ($($name,)+) {
            fn write_key_part(&self, out: &mut String) {
                out.push('t');
                out.push_str(stringify!($len));
                out.push('(');
                $(self.$idx.write_key_part(out);)+
                out.push(')');
            }
        }
    };
}

impl_key_part_tuple!(1 => A 0);
impl_key_part_tuple!(2 => A 0, B 1);
impl_key_part_tuple!(3 => A 0, B 1, C 2);
impl_key_part_tuple!(4 => A 0, B 1, C 2, D 3);
impl_key_part_tuple!(5 => A 0, B 1, C 2, D 3, E 4);
impl_key_part_tuple!(6 => A 0, B 1, C 2, D 3, E 4, F 5);

/// Wrapper declaring a value as per-call context
///
/// The wrapped value never influences a cache key: it renders as a fixed
/// marker and reports [`KeyPart::is_call_context`], so the context-stripping
/// builder drops it from named arguments.
#[derive(Debug, Clone, Default)]
pub struct CallContext<T>(pub T);

impl<T> CallContext<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for CallContext<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> KeyPart for CallContext<T> {
    fn write_key_part(&self, out: &mut String) {
        out.push('x');
    }

    fn is_call_context(&self) -> bool {
        true
    }
}

/// A named argument after rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedArg {
    /// Canonical rendering of the value
    pub repr: String,

    /// Whether the value declared itself per-call context
    pub call_context: bool,
}

/// Rendered arguments of one call
///
/// Positional arguments keep call order; named arguments are kept sorted by
/// name, so the order in which they were supplied never matters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    positional: Vec<String>,
    named: BTreeMap<String, NamedArg>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg<T: KeyPart + ?Sized>(mut self, value: &T) -> Self {
        self.push_arg(value);
        self
    }

    /// Add a named argument, replacing any previous value under that name
    pub fn named<T: KeyPart + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Self {
        self.insert_named(name, value);
        self
    }

    pub fn push_arg<T: KeyPart + ?Sized>(&mut self, value: &T) {
        self.positional.push(key_repr(value));
    }

    pub fn insert_named<T: KeyPart + ?Sized>(&mut self, name: impl Into<String>, value: &T) {
        self.named.insert(
            name.into(),
            NamedArg {
                repr: key_repr(value),
                call_context: value.is_call_context(),
            },
        );
    }

    /// Rendered positional arguments in call order
    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    /// Named arguments sorted by name
    pub fn named_args(&self) -> impl Iterator<Item = (&str, &NamedArg)> {
        self.named.iter().map(|(name, arg)| (name.as_str(), arg))
    }

    /// Copy of these arguments keeping only the named arguments accepted by `keep`
    pub fn retain_named<P>(&self, mut keep: P) -> CallArgs
    where
        P: FnMut(&str, &NamedArg) -> bool,
    {
        CallArgs {
            positional: self.positional.clone(),
            named: self
                .named
                .iter()
                .filter(|(name, arg)| keep(name.as_str(), *arg))
                .map(|(name, arg)| (name.clone(), arg.clone()))
                .collect(),
        }
    }
}

/// Conversion of a handler's input into rendered call arguments
pub trait CacheArgs {
    fn call_args(&self) -> CallArgs;
}

impl CacheArgs for CallArgs {
    fn call_args(&self) -> CallArgs {
        self.clone()
    }
}

impl CacheArgs for () {
    fn call_args(&self) -> CallArgs {
        CallArgs::new()
    }
}

macro_rules! impl_cache_args_tuple {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: KeyPart),+> CacheArgs for ($($name,)+) {
            fn call_args(&self) -> CallArgs {
                CallArgs::new()$(.arg(&self.$idx))+
            }
        }
    };
}

impl_cache_args_tuple!(A 0);
impl_cache_args_tuple!(A 0, B 1);
impl_cache_args_tuple!(A 0, B 1, C 2);
impl_cache_args_tuple!(A 0, B 1, C 2, D 3);
impl_cache_args_tuple!(A 0, B 1, C 2, D 3, E 4);
impl_cache_args_tuple!(A 0, B 1, C 2, D 3, E 4, F 5);

/// Registry values a key builder needs
#[derive(Debug, Clone, Copy)]
pub struct KeyContext<'a> {
    pub prefix: &'a str,
    pub namespace_token: &'a str,
    pub hasher: &'a dyn HashFunction,
}

/// Maps a handler identity and its arguments to a cache key
///
/// Must be total and deterministic.
pub trait KeyBuilder: Send + Sync + fmt::Debug {
    fn build(&self, ctx: &KeyContext<'_>, handler: &str, args: &CallArgs) -> CacheKey;
}

/// Hashes every argument it is given
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicKeyBuilder;

impl BasicKeyBuilder {
    /// Canonical bytes hashed into the fingerprint:
    /// `token | positional... | (name, value)...` with every component framed
    pub fn canonical_repr(namespace_token: &str, args: &CallArgs) -> String {
        let mut out = String::new();
        push_framed(&mut out, namespace_token);
        out.push('|');
        for repr in args.positional() {
            push_framed(&mut out, repr);
        }
        out.push('|');
        for (name, arg) in args.named_args() {
            push_framed(&mut out, name);
            push_framed(&mut out, &arg.repr);
        }
        out
    }
}

impl KeyBuilder for BasicKeyBuilder {
    fn build(&self, ctx: &KeyContext<'_>, handler: &str, args: &CallArgs) -> CacheKey {
        let canonical = Self::canonical_repr(ctx.namespace_token, args);
        let fingerprint = ctx.hasher.hex_digest(canonical.as_bytes());
        format!("{}/{}:{}", ctx.prefix, handler, fingerprint)
    }
}

/// Predicate deciding which named arguments are per-call context
pub trait ContextFilter: Send + Sync {
    fn is_call_context(&self, name: &str, arg: &NamedArg) -> bool;
}

impl<F> ContextFilter for F
where
    F: Fn(&str, &NamedArg) -> bool + Send + Sync,
{
    fn is_call_context(&self, name: &str, arg: &NamedArg) -> bool {
        self(name, arg)
    }
}

/// Default context predicate
///
/// A named argument is context when its name starts with the reserved prefix
/// (`__` by default) or its value reports [`KeyPart::is_call_context`].
#[derive(Debug, Clone)]
pub struct ReservedNameFilter {
    prefix: String,
}

impl ReservedNameFilter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for ReservedNameFilter {
    fn default() -> Self {
        Self::new(RESERVED_CONTEXT_PREFIX)
    }
}

impl ContextFilter for ReservedNameFilter {
    fn is_call_context(&self, name: &str, arg: &NamedArg) -> bool {
        arg.call_context || (!self.prefix.is_empty() && name.starts_with(&self.prefix))
    }
}

/// Key builder for framework-bound handlers (default)
///
/// Drops named arguments the filter classifies as per-call context, then
/// delegates to [`BasicKeyBuilder`].
pub struct ContextStrippingKeyBuilder<F = ReservedNameFilter> {
    filter: F,
}

impl ContextStrippingKeyBuilder {
    pub fn new() -> Self {
        Self {
            filter: ReservedNameFilter::default(),
        }
    }
}

impl Default for ContextStrippingKeyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ContextFilter> ContextStrippingKeyBuilder<F> {
    /// Use a custom context predicate
    pub fn with_filter(filter: F) -> Self {
        Self { filter }
    }
}

impl<F> fmt::Debug for ContextStrippingKeyBuilder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextStrippingKeyBuilder").finish_non_exhaustive()
    }
}

impl<F: ContextFilter> KeyBuilder for ContextStrippingKeyBuilder<F> {
    fn build(&self, ctx: &KeyContext<'_>, handler: &str, args: &CallArgs) -> CacheKey {
        let business = args.retain_named(|name, arg| !self.filter.is_call_context(name, arg));
        BasicKeyBuilder.build(ctx, handler, &business)
    }
}
