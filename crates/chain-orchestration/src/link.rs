//! Chain link parsing and resolution
//!
//! A service definition may name the chain it attaches to in its `chain`
//! field:
//!
//! ```text
//! link   := target (':' alias)?
//! target := '$chain' | name
//! name   := [A-Za-z0-9_.-]+
//! ```
//!
//! `$chain` stands for whichever chain the caller selected through a
//! [`ChainContext`]; any other target names a chain literally.

use crate::naming::Naming;
use crate::{Error, Result};
use container_engine::{ContainerEngine, ContainerLink};
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::combinator::{all_consuming, map, opt};
use nom::sequence::preceded;
use nom::{IResult, Parser};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Token standing for the chain selected by the context
pub const PLACEHOLDER: &str = "$chain";

/// Alias used when a placeholder link names none
pub const DEFAULT_ALIAS: &str = "chain";

/// Parsed form of a service's `chain` field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkSpec {
    /// The service does not link to a chain
    #[default]
    None,
    /// Link to the chain selected by the context
    Placeholder {
        /// Name the chain is visible under
        alias: String,
    },
    /// Link to a named chain
    Literal {
        /// Chain name
        name: String,
        /// Name the chain is visible under
        alias: String,
    },
}

enum Target<'a> {
    Placeholder,
    Name(&'a str),
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn name(input: &str) -> IResult<&str, &str> {
    take_while1(is_name_char).parse(input)
}

fn target(input: &str) -> IResult<&str, Target<'_>> {
    alt((
        map(tag(PLACEHOLDER), |_| Target::Placeholder),
        map(name, Target::Name),
    ))
    .parse(input)
}

fn link(input: &str) -> IResult<&str, (Target<'_>, Option<&str>)> {
    (target, opt(preceded(tag(":"), name))).parse(input)
}

impl LinkSpec {
    /// Parse a `chain` field; empty means no link
    pub fn parse(field: &str) -> Result<Self> {
        let field = field.trim();
        if field.is_empty() {
            return Ok(LinkSpec::None);
        }

        let (_, (target, alias)) =
            all_consuming(link)
                .parse(field)
                .map_err(|e| Error::InvalidLink {
                    field: field.to_string(),
                    reason: match e {
                        nom::Err::Error(e) | nom::Err::Failure(e) => {
                            format!("unexpected input at '{}'", e.input)
                        }
                        nom::Err::Incomplete(_) => "incomplete input".to_string(),
                    },
                })?;

        Ok(match target {
            Target::Placeholder => LinkSpec::Placeholder {
                alias: alias.unwrap_or(DEFAULT_ALIAS).to_string(),
            },
            Target::Name(name) => LinkSpec::Literal {
                name: name.to_string(),
                alias: alias.unwrap_or(name).to_string(),
            },
        })
    }

    /// Parse an optional field
    pub fn parse_opt(field: Option<&str>) -> Result<Self> {
        field.map_or(Ok(LinkSpec::None), Self::parse)
    }

    /// Returns true for [`LinkSpec::None`]
    pub fn is_none(&self) -> bool {
        matches!(self, LinkSpec::None)
    }
}

impl fmt::Display for LinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkSpec::None => Ok(()),
            LinkSpec::Placeholder { alias } => write!(f, "{}:{}", PLACEHOLDER, alias),
            LinkSpec::Literal { name, alias } => write!(f, "{}:{}", name, alias),
        }
    }
}

/// The chain a resolution or walk is performed for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainContext {
    chain: Option<String>,
}

impl ChainContext {
    /// Context with an optional chain
    pub fn new(chain: Option<String>) -> Self {
        Self {
            chain: chain.filter(|c| !c.is_empty()),
        }
    }

    /// Context without a chain
    pub fn none() -> Self {
        Self::default()
    }

    /// Context selecting `name`
    pub fn chain(name: impl Into<String>) -> Self {
        Self::new(Some(name.into()))
    }

    /// Selected chain, if any
    pub fn name(&self) -> Option<&str> {
        self.chain.as_deref()
    }
}

/// Resolves [`LinkSpec`]s to container links
#[derive(Clone)]
pub struct LinkResolver {
    engine: Arc<dyn ContainerEngine>,
    naming: Naming,
}

impl LinkResolver {
    /// Create a resolver
    pub fn new(engine: Arc<dyn ContainerEngine>, naming: Naming) -> Self {
        Self { engine, naming }
    }

    /// Resolve the chain link of `service`
    ///
    /// Literal targets are linked as named without checking that the chain
    /// container exists; the engine reports the problem when the dependent
    /// container is created.
    pub async fn resolve(
        &self,
        service: &str,
        spec: &LinkSpec,
        ctx: &ChainContext,
    ) -> Result<Option<ContainerLink>> {
        match spec {
            LinkSpec::None => Ok(None),
            LinkSpec::Placeholder { alias } => {
                let chain = ctx.name().ok_or_else(|| Error::MissingChainContext {
                    service: service.to_string(),
                })?;
                let container = self.naming.chain(chain);
                if !self.engine.status(&container).await?.exists() {
                    return Err(Error::UnresolvedChainLink {
                        service: service.to_string(),
                        chain: chain.to_string(),
                    });
                }
                debug!("Resolved $chain for '{}' to {}", service, container);
                Ok(Some(ContainerLink::new(container, alias.clone())))
            }
            LinkSpec::Literal { name, alias } => {
                let container = self.naming.chain(name);
                debug!("Linking '{}' to {} (unchecked)", service, container);
                Ok(Some(ContainerLink::new(container, alias.clone())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use container_engine::{ContainerSpec, MemoryEngine};

    #[test]
    fn test_parse_variants() {
        assert_eq!(LinkSpec::parse("").unwrap(), LinkSpec::None);
        assert_eq!(LinkSpec::parse("   ").unwrap(), LinkSpec::None);
        assert_eq!(
            LinkSpec::parse("$chain").unwrap(),
            LinkSpec::Placeholder {
                alias: "chain".to_string()
            }
        );
        assert_eq!(
            LinkSpec::parse("$chain:fake").unwrap(),
            LinkSpec::Placeholder {
                alias: "fake".to_string()
            }
        );
        assert_eq!(
            LinkSpec::parse("alpha").unwrap(),
            LinkSpec::Literal {
                name: "alpha".to_string(),
                alias: "alpha".to_string()
            }
        );
        assert_eq!(
            LinkSpec::parse("alpha:node").unwrap(),
            LinkSpec::Literal {
                name: "alpha".to_string(),
                alias: "node".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for field in ["$chainx", "$chain:", "alpha:", ":alias", "a:b:c", "bad name", "$other"] {
            let err = LinkSpec::parse(field).unwrap_err();
            assert!(matches!(err, Error::InvalidLink { .. }), "accepted {}", field);
        }
    }

    #[test]
    fn test_display_round_trip() {
        let spec = LinkSpec::parse("$chain:fake").unwrap();
        assert_eq!(LinkSpec::parse(&spec.to_string()).unwrap(), spec);
    }

    fn resolver() -> (Arc<MemoryEngine>, LinkResolver) {
        let engine = Arc::new(MemoryEngine::new());
        let resolver = LinkResolver::new(engine.clone(), Naming::new("harness"));
        (engine, resolver)
    }

    #[smol_potat::test]
    async fn test_placeholder_needs_context() {
        let (_, resolver) = resolver();
        let spec = LinkSpec::parse("$chain:fake").unwrap();
        let err = resolver
            .resolve("fake", &spec, &ChainContext::none())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingChainContext { .. }));
    }

    #[smol_potat::test]
    async fn test_placeholder_needs_existing_chain() {
        let (engine, resolver) = resolver();
        let spec = LinkSpec::parse("$chain:fake").unwrap();
        let ctx = ChainContext::chain("alpha");

        let err = resolver.resolve("fake", &spec, &ctx).await.unwrap_err();
        assert!(matches!(err, Error::UnresolvedChainLink { ref chain, .. } if chain == "alpha"));

        engine
            .create(&ContainerSpec::new("harness-chain-alpha", "chain"))
            .await
            .unwrap();
        let link = resolver.resolve("fake", &spec, &ctx).await.unwrap();
        assert_eq!(link, Some(ContainerLink::new("harness-chain-alpha", "fake")));
    }

    #[smol_potat::test]
    async fn test_literal_ignores_context_and_existence() {
        let (_, resolver) = resolver();
        let spec = LinkSpec::parse("nonexistent").unwrap();
        let link = resolver
            .resolve("fake", &spec, &ChainContext::chain("alpha"))
            .await
            .unwrap();
        assert_eq!(
            link,
            Some(ContainerLink::new("harness-chain-nonexistent", "nonexistent"))
        );
    }

    #[smol_potat::test]
    async fn test_none_resolves_to_nothing() {
        let (_, resolver) = resolver();
        let link = resolver
            .resolve("keys", &LinkSpec::None, &ChainContext::none())
            .await
            .unwrap();
        assert_eq!(link, None);
    }
}
