//! Path expressions
//!
//! Targets, selects and condition paths are path expressions:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `ns:/a/b` | the object at that path |
//! | `/` | roots |
//! | `*` | children |
//! | `**` | every descendant |
//! | `..` / `.` | parent / current |
//! | `a\|b`, `a&b` | any / all of several terms in one segment |
//! | `uuid=<hex>` | the object with that uuid |
//! | `content-type=State` | objects of a content type |
//! | `type=<definition>` | objects with a definition uuid |
//! | `~name`, `~ma*` | name contains / wildcard |
//!
//! Several expressions are separated by `;`. An absolute expression with a namespace
//! resolves its leading plain segments to a base uuid without any lookup; a relative
//! expression is evaluated from the objects it is applied to.

use crate::engine::client::EntitiesClient;
use crate::error::ClientError;
use crate::models::collection::EntityCollection;
use crate::models::content_type::ContentType;
use crate::models::object::ObjectEntity;
use crate::models::path;
use crate::models::request::{ObjectQueryRequest, ObjectQueryType, SortOrder};
use regex::Regex;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub enum Term {
    Name(String),
    Uuid(String),
    ContentType(ContentType),
    Definition(String),
    Like(Regex),
    /// A selector that can never match (unknown content type, bad pattern)
    Nothing,
}

impl Term {
    fn parse(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        if let Some(uuid) = lower.strip_prefix("uuid=") {
            return Term::Uuid(uuid.to_string());
        }
        if let Some(value) = lower
            .strip_prefix("content-type=")
            .or_else(|| lower.strip_prefix("contenttype="))
        {
            return value.parse().map(Term::ContentType).unwrap_or(Term::Nothing);
        }
        if lower.starts_with("type=") {
            return Term::Definition(text["type=".len()..].to_string());
        }
        if let Some(pattern) = text.strip_prefix('~') {
            let pattern = if pattern.contains('*') {
                pattern.to_string()
            } else {
                format!("*{}*", pattern)
            };
            let expression = format!("(?i)^{}$", regex::escape(&pattern).replace(r"\*", ".*"));
            return Regex::new(&expression).map(Term::Like).unwrap_or(Term::Nothing);
        }
        Term::Name(text.to_string())
    }

    pub fn matches(&self, object: &ObjectEntity) -> bool {
        match self {
            Term::Name(name) => object.name().eq_ignore_ascii_case(name),
            Term::Uuid(uuid) => object.uuid.eq_ignore_ascii_case(uuid),
            Term::ContentType(content_type) => object.content_type == *content_type,
            Term::Definition(definition) => object
                .definition_uuid
                .as_deref()
                .map_or(false, |d| d.eq_ignore_ascii_case(definition)),
            Term::Like(pattern) => pattern.is_match(object.name()),
            Term::Nothing => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Segment {
    Root,
    Current,
    Parent,
    Children,
    Descendants,
    /// Children matching any (`|`) or all (`&`) of the terms
    Match { terms: Vec<Term>, all: bool },
}

impl Segment {
    fn parse(text: &str) -> Self {
        match text {
            "." => Segment::Current,
            ".." => Segment::Parent,
            "*" => Segment::Children,
            "**" => Segment::Descendants,
            _ if text.contains('&') => Segment::Match {
                terms: text.split('&').map(str::trim).map(Term::parse).collect(),
                all: true,
            },
            _ => Segment::Match {
                terms: text.split('|').map(str::trim).map(Term::parse).collect(),
                all: false,
            },
        }
    }

    fn accepts(&self, object: &ObjectEntity) -> bool {
        match self {
            Segment::Match { terms, all: true } => terms.iter().all(|t| t.matches(object)),
            Segment::Match { terms, all: false } => terms.iter().any(|t| t.matches(object)),
            _ => true,
        }
    }

    /// A single plain name (or pinned uuid) that can be hashed into a path uuid
    fn plain_name(&self) -> Option<String> {
        match self {
            Segment::Match { terms, .. } if terms.len() == 1 => match &terms[0] {
                Term::Name(name) => Some(name.clone()),
                Term::Uuid(uuid) => Some(format!("uuid={}", uuid)),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathExpression {
    pub text: String,
    pub namespace: Option<String>,
    /// Uuid of the leading plain segments of an absolute expression
    pub base_uuid: Option<String>,
    /// Starts from the top of the tree rather than from given objects
    pub anchored: bool,
    pub segments: Vec<Segment>,
}

impl PathExpression {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let namespace = path::namespace(text)
            .map(str::trim)
            .filter(|ns| !ns.is_empty() && !ns.contains(path::PATH_SEPARATOR))
            .map(str::to_string);
        let partial = match namespace {
            Some(_) => path::partial_path(text),
            None => text,
        };
        let anchored = partial.starts_with(path::PATH_SEPARATOR);

        let mut segments: Vec<Segment> = partial
            .split(path::PATH_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Segment::parse)
            .collect();
        if anchored && segments.is_empty() {
            segments.push(Segment::Root);
        }

        let mut base_uuid = None;
        if let (true, Some(ns)) = (anchored, namespace.as_deref()) {
            let plain: Vec<String> = segments.iter().map_while(Segment::plain_name).collect();
            if !plain.is_empty() {
                base_uuid = path::object_uuid(ns, &format!("/{}", plain.join("/")));
                if base_uuid.is_some() {
                    segments.drain(..plain.len());
                }
            }
        }

        Self {
            text: text.to_string(),
            namespace,
            base_uuid,
            anchored,
            segments,
        }
    }

    /// Names exactly one object without any lookup
    pub fn is_absolute(&self) -> bool {
        self.base_uuid.is_some() && self.segments.is_empty()
    }

    fn in_namespace(&self, object: &ObjectEntity) -> bool {
        self.namespace
            .as_deref()
            .map_or(true, |ns| object.namespace.eq_ignore_ascii_case(ns))
    }
}

/// Split `a;b` and parse each part
pub fn parse_expressions(text: &str) -> Vec<PathExpression> {
    text.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathExpression::parse)
        .collect()
}

/// Relative `expression` resolved under `parent` (`..` and `.` keep their meaning)
pub fn combine(parent: &str, expression: &str) -> String {
    match expression.trim() {
        "" | "." => parent.to_string(),
        other => path::combine(&[parent, other]),
    }
}

fn sort_unique(objects: Vec<ObjectEntity>) -> Vec<ObjectEntity> {
    let mut seen = HashSet::new();
    let mut unique: Vec<ObjectEntity> = objects
        .into_iter()
        .filter(|o| seen.insert(o.uuid.clone()))
        .collect();
    unique.sort_by(|a, b| (&a.namespace, &a.path).cmp(&(&b.namespace, &b.path)));
    unique
}

// ===== Local =====

/// Evaluate expressions against a snapshot; relative expressions start at `parents`
pub fn evaluate_local(
    collection: &EntityCollection,
    expressions: &[PathExpression],
    parents: &[ObjectEntity],
) -> Vec<ObjectEntity> {
    let mut found = Vec::new();
    for expression in expressions {
        found.extend(evaluate_one_local(collection, expression, parents));
    }
    sort_unique(found)
}

fn evaluate_one_local(
    collection: &EntityCollection,
    expression: &PathExpression,
    parents: &[ObjectEntity],
) -> Vec<ObjectEntity> {
    // `None` is the top of the tree, above the roots
    let mut current: Option<Vec<ObjectEntity>> = match (&expression.base_uuid, expression.anchored) {
        (Some(base), _) => Some(collection.object(base).cloned().into_iter().collect()),
        (None, true) => None,
        (None, false) => Some(parents.to_vec()),
    };

    for segment in &expression.segments {
        let next: Vec<ObjectEntity> = match (segment, &current) {
            (Segment::Root, _) => collection.roots(expression.namespace.as_deref()).into_iter().cloned().collect(),
            (Segment::Current, Some(objects)) => objects.clone(),
            (Segment::Current, None) => Vec::new(),
            (Segment::Parent, Some(objects)) => objects
                .iter()
                .filter_map(|o| collection.parent(&o.uuid).cloned())
                .collect(),
            (Segment::Parent, None) => Vec::new(),
            (Segment::Descendants, Some(objects)) => objects
                .iter()
                .flat_map(|o| collection.descendants(&o.uuid))
                .cloned()
                .collect(),
            (Segment::Descendants, None) => collection
                .roots(expression.namespace.as_deref())
                .into_iter()
                .flat_map(|root| std::iter::once(root).chain(collection.descendants(&root.uuid)))
                .cloned()
                .collect(),
            (Segment::Children | Segment::Match { .. }, Some(objects)) => objects
                .iter()
                .flat_map(|o| collection.children(&o.uuid))
                .filter(|o| segment.accepts(o))
                .cloned()
                .collect(),
            (Segment::Children | Segment::Match { .. }, None) => collection
                .roots(expression.namespace.as_deref())
                .into_iter()
                .filter(|o| segment.accepts(o))
                .cloned()
                .collect(),
        };
        current = Some(next);
    }

    current
        .unwrap_or_default()
        .into_iter()
        .filter(|o| expression.in_namespace(o))
        .collect()
}

// ===== Remote =====

/// Evaluate expressions through a client; relative expressions start at `parents`
pub async fn evaluate_remote(
    client: &dyn EntitiesClient,
    expressions: &[PathExpression],
    parents: &[ObjectEntity],
    take: u64,
) -> Result<Vec<ObjectEntity>, ClientError> {
    let mut found = Vec::new();
    for expression in expressions {
        found.extend(evaluate_one_remote(client, expression, parents, take).await?);
    }
    Ok(sort_unique(found))
}

async fn roots(client: &dyn EntitiesClient, namespace: Option<&str>) -> Result<Vec<ObjectEntity>, ClientError> {
    let roots = client.query_by_parent_uuid(&[None]).await?;
    Ok(roots
        .into_iter()
        .filter(|o| namespace.map_or(true, |ns| o.namespace.eq_ignore_ascii_case(ns)))
        .collect())
}

async fn evaluate_one_remote(
    client: &dyn EntitiesClient,
    expression: &PathExpression,
    parents: &[ObjectEntity],
    take: u64,
) -> Result<Vec<ObjectEntity>, ClientError> {
    let namespace = expression.namespace.as_deref();
    let mut current: Option<Vec<ObjectEntity>> = match (&expression.base_uuid, expression.anchored) {
        (Some(base), _) => Some(client.read_objects(std::slice::from_ref(base)).await?),
        (None, true) => None,
        (None, false) => Some(parents.to_vec()),
    };

    for segment in &expression.segments {
        let uuids: Vec<String> = current.iter().flatten().map(|o| o.uuid.clone()).collect();

        let next = match (segment, &current) {
            (Segment::Root, _) => roots(client, namespace).await?,
            (Segment::Current, Some(objects)) => objects.clone(),
            (Segment::Parent, Some(_)) => client.query_parents(&uuids).await?,
            (Segment::Current | Segment::Parent, None) => Vec::new(),
            (Segment::Descendants, Some(_)) => client.query_descendants(&uuids).await?,
            (Segment::Descendants, None) => {
                let roots = roots(client, namespace).await?;
                let root_uuids: Vec<String> = roots.iter().map(|o| o.uuid.clone()).collect();
                let mut all = roots;
                all.extend(client.query_descendants(&root_uuids).await?);
                all
            }
            (Segment::Match { .. }, _) if segment.plain_name().is_some() => {
                // exact names go through the (memoized) object query
                let name = segment.plain_name().unwrap_or_default();
                let scope: Vec<Option<String>> = match &current {
                    Some(_) => uuids.iter().cloned().map(Some).collect(),
                    None => vec![None],
                };
                if scope.is_empty() {
                    Vec::new()
                } else {
                    let request = ObjectQueryRequest::new(ObjectQueryType::Name, name)
                        .in_namespace(namespace)
                        .with_parents(scope, 1);
                    client
                        .query_objects(&request, 0, take, SortOrder::Ascending)
                        .await?
                        .into_iter()
                        .filter(|o| segment.accepts(o))
                        .collect()
                }
            }
            (Segment::Children | Segment::Match { .. }, Some(_)) => {
                let scope: Vec<Option<String>> = uuids.iter().cloned().map(Some).collect();
                if scope.is_empty() {
                    Vec::new()
                } else {
                    client
                        .query_by_parent_uuid(&scope)
                        .await?
                        .into_iter()
                        .filter(|o| segment.accepts(o))
                        .collect()
                }
            }
            (Segment::Children | Segment::Match { .. }, None) => roots(client, namespace)
                .await?
                .into_iter()
                .filter(|o| segment.accepts(o))
                .collect(),
        };
        current = Some(next);
    }

    Ok(current
        .unwrap_or_default()
        .into_iter()
        .filter(|o| expression.in_namespace(o))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(path: &str, content_type: ContentType) -> ObjectEntity {
        ObjectEntity::new("plant", path, content_type, 1).unwrap()
    }

    fn sample() -> EntityCollection {
        let mut collection = EntityCollection::new();
        collection.add_objects([
            object("/area1", ContentType::Directory),
            object("/area1/m1", ContentType::Directory),
            object("/area1/m1/state", ContentType::State),
            object("/area1/m2", ContentType::Directory),
            object("/area1/m2/state", ContentType::State),
            object("/area2", ContentType::Directory),
        ]);
        collection.add_object(
            ObjectEntity::new("other", "/area1", ContentType::Directory, 1).unwrap(),
        );
        collection
    }

    fn paths(objects: &[ObjectEntity]) -> Vec<&str> {
        objects.iter().map(|o| o.path.as_str()).collect()
    }

    fn run(collection: &EntityCollection, text: &str) -> Vec<ObjectEntity> {
        evaluate_local(collection, &parse_expressions(text), &[])
    }

    #[test]
    fn test_absolute_prefix_becomes_base_uuid() {
        let expression = PathExpression::parse("plant:/area1/*");
        assert_eq!(
            expression.base_uuid,
            path::object_uuid("plant", "/area1")
        );
        assert_eq!(expression.segments.len(), 1);
        assert!(PathExpression::parse("plant:/area1/m1").is_absolute());
        assert!(!PathExpression::parse("state").anchored);
    }

    #[test]
    fn test_children_and_descendants() {
        let collection = sample();
        assert_eq!(paths(&run(&collection, "plant:/area1/*")), vec!["/area1/m1", "/area1/m2"]);
        assert_eq!(
            paths(&run(&collection, "plant:/area1/**")),
            vec!["/area1/m1", "/area1/m1/state", "/area1/m2", "/area1/m2/state"]
        );
        assert_eq!(run(&collection, "plant:/").len(), 2);
        assert_eq!(run(&collection, "/area1").len(), 2);
    }

    #[test]
    fn test_terms() {
        let collection = sample();
        assert_eq!(
            paths(&run(&collection, "plant:/area1/*/content-type=State")),
            vec!["/area1/m1/state", "/area1/m2/state"]
        );
        assert_eq!(paths(&run(&collection, "plant:/area1/m1|m2")), vec!["/area1/m1", "/area1/m2"]);
        assert_eq!(paths(&run(&collection, "plant:/area1/~M*")), vec!["/area1/m1", "/area1/m2"]);
        assert_eq!(paths(&run(&collection, "plant:/~rea")), vec!["/area1", "/area2"]);
        assert!(run(&collection, "plant:/area1/content-type=Nope").is_empty());
        assert_eq!(run(&collection, "plant:/area1/m1;plant:/area1/m1/state").len(), 2);
    }

    #[test]
    fn test_relative_from_parents() {
        let collection = sample();
        let machines = run(&collection, "plant:/area1/*");

        let states = evaluate_local(&collection, &parse_expressions("state"), &machines);
        assert_eq!(paths(&states), vec!["/area1/m1/state", "/area1/m2/state"]);

        let same = evaluate_local(&collection, &parse_expressions("."), &machines[..1]);
        assert_eq!(paths(&same), vec!["/area1/m1"]);

        let up = evaluate_local(&collection, &parse_expressions(".."), &machines);
        assert_eq!(paths(&up), vec!["/area1"]);

        assert!(evaluate_local(&collection, &parse_expressions("state"), &[]).is_empty());
    }

    #[test]
    fn test_combine() {
        assert_eq!(combine("plant:/area1/*", "."), "plant:/area1/*");
        assert_eq!(combine("plant:/area1/*", "state"), "plant:/area1/*/state");
    }
}
