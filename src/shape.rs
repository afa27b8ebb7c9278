//! The shape model: the nested placeholder structure a template expects.
//!
//! A model maps every top-level variable to a [`Shape`]. Repeated references
//! to the same variable are combined with [`Shape::merge`], which never loses
//! structure: a list beats an object, and an object beats a leaf.

use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};

/// Top-level variables in first-seen order.
pub type Model = IndexMap<String, Shape>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Placeholder(Placeholder),
    /// Literal boolean; never produced by analysis, only by hand-built models.
    Bool(bool),
    Object(IndexMap<String, Shape>),
    List(Vec<Shape>),
}

/// Leaf standing in for real data, rendered as `<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    /// Set when the value is only ever tested for truthiness.
    pub condition: bool,
}

impl Placeholder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: false,
        }
    }

    pub fn text(&self) -> String {
        format!("<{}>", self.name)
    }
}

impl Shape {
    pub fn placeholder(name: impl Into<String>) -> Self {
        Shape::Placeholder(Placeholder::new(name))
    }

    pub fn condition(name: impl Into<String>) -> Self {
        Shape::Placeholder(Placeholder {
            name: name.into(),
            condition: true,
        })
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Shape)>) -> Self {
        Shape::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Right-nested single-key mappings for an attribute path.
    ///
    /// `["user", "address", "city"]` becomes the top-level key `user` with
    /// shape `{address: {city: <city>}}`.
    pub fn from_path(path: &[String]) -> Option<(String, Shape)> {
        let (last, init) = path.split_last()?;
        let mut key = last.clone();
        let mut shape = Shape::placeholder(last.clone());
        for segment in init.iter().rev() {
            shape = Shape::Object(IndexMap::from([(key, shape)]));
            key = segment.clone();
        }
        Some((key, shape))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Shape::Placeholder(_) | Shape::Bool(_))
    }

    /// Merge `incoming` into `self`, keeping the richer of the two shapes.
    pub fn merge(&mut self, incoming: Shape) {
        match self {
            Shape::List(items) => {
                if let Shape::List(other) = incoming {
                    merge_items(items, other);
                }
            }
            Shape::Object(fields) => match incoming {
                Shape::Object(other) => {
                    for (key, shape) in other {
                        merge_entry(fields, key, shape);
                    }
                }
                Shape::List(_) => *self = incoming,
                Shape::Placeholder(_) | Shape::Bool(_) => {}
            },
            Shape::Placeholder(existing) => match incoming {
                Shape::Placeholder(other) => existing.condition |= other.condition,
                Shape::Bool(_) => {}
                Shape::Object(_) | Shape::List(_) => *self = incoming,
            },
            Shape::Bool(_) => {
                if !incoming.is_leaf() {
                    *self = incoming;
                }
            }
        }
    }
}

/// Merge `shape` into the entry for `key`, inserting it if absent.
pub fn merge_entry(fields: &mut IndexMap<String, Shape>, key: String, shape: Shape) {
    match fields.get_mut(&key) {
        Some(existing) => existing.merge(shape),
        None => {
            fields.insert(key, shape);
        }
    }
}

fn merge_items(items: &mut Vec<Shape>, other: Vec<Shape>) {
    for (idx, item) in other.into_iter().enumerate() {
        match items.get_mut(idx) {
            Some(existing) => existing.merge(item),
            None => items.push(item),
        }
    }
}

/// The plain form: condition markers stripped, placeholders as strings.
impl Serialize for Shape {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Shape::Placeholder(placeholder) => serializer.serialize_str(&placeholder.text()),
            Shape::Bool(b) => serializer.serialize_bool(*b),
            Shape::Object(fields) => serializer.collect_map(fields),
            Shape::List(items) => serializer.collect_seq(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn nested_path() {
        let (key, shape) = Shape::from_path(&path(&["user", "address", "city"])).unwrap();
        assert_eq!(key, "user");
        assert_eq!(
            shape,
            Shape::object([("address", Shape::object([("city", Shape::placeholder("city"))]))])
        );
    }

    #[test]
    fn empty_path_has_no_shape() {
        assert_eq!(Shape::from_path(&[]), None);
    }

    #[test]
    fn object_absorbs_scalar_in_either_order() {
        let object = Shape::object([("y", Shape::placeholder("y"))]);

        let mut a = Shape::placeholder("x");
        a.merge(object.clone());
        assert_eq!(a, object);

        let mut b = object.clone();
        b.merge(Shape::placeholder("x"));
        assert_eq!(b, object);
    }

    #[test]
    fn objects_union_keys_in_first_seen_order() {
        let mut a = Shape::object([
            ("b", Shape::placeholder("b")),
            ("c", Shape::placeholder("c")),
        ]);
        a.merge(Shape::object([
            ("a", Shape::placeholder("a")),
            ("b", Shape::object([("z", Shape::placeholder("z"))])),
        ]));
        let Shape::Object(fields) = &a else {
            panic!("expected object");
        };
        assert_eq!(fields.keys().collect::<Vec<_>>(), ["b", "c", "a"]);
        assert_eq!(fields["b"], Shape::object([("z", Shape::placeholder("z"))]));
    }

    #[test]
    fn list_wins_over_object() {
        let list = Shape::List(vec![Shape::object([("name", Shape::placeholder("name"))])]);

        let mut a = Shape::object([("count", Shape::placeholder("count"))]);
        a.merge(list.clone());
        assert_eq!(a, list);

        let mut b = list.clone();
        b.merge(Shape::object([("count", Shape::placeholder("count"))]));
        assert_eq!(b, list);
    }

    #[test]
    fn list_items_merge() {
        let mut a = Shape::List(vec![Shape::object([("a", Shape::placeholder("a"))])]);
        a.merge(Shape::List(vec![Shape::object([("b", Shape::condition("b"))])]));
        assert_eq!(
            a,
            Shape::List(vec![Shape::object([
                ("a", Shape::placeholder("a")),
                ("b", Shape::condition("b")),
            ])])
        );
    }

    #[test]
    fn condition_flag_is_kept() {
        let mut a = Shape::placeholder("done");
        a.merge(Shape::condition("done"));
        assert_eq!(a, Shape::condition("done"));
        a.merge(Shape::placeholder("done"));
        assert_eq!(a, Shape::condition("done"));
    }

    #[test]
    fn plain_serialization_strips_markers() {
        let shape = Shape::object([
            ("active", Shape::condition("active")),
            ("tags", Shape::List(vec![])),
            ("enabled", Shape::Bool(true)),
        ]);
        assert_eq!(
            serde_json::to_value(&shape).unwrap(),
            serde_json::json!({"active": "<active>", "tags": [], "enabled": true})
        );
    }
}
