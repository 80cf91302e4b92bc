// File naming for dumped pages: `{cluster}`, `{column}` and `{page}` placeholders.
use crate::core::descriptor::DescriptorId;
use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_PAGE_TEMPLATE: &str = "cluster{cluster}_{column}_pg{page}.page";

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Literal(String),
    Cluster,
    Column,
    Page,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageFileTemplate {
    segments: Vec<Segment>,
}

impl PageFileTemplate {
    pub fn parse(template: &str) -> Result<Self, Error> {
        let invalid = |message: String| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message(message)
                .with_hint("Placeholders are {cluster}, {column} and {page}.")
        };
        if template.is_empty() {
            return Err(invalid("page file template is empty".to_string()));
        }
        if template.contains(['/', '\\']) {
            return Err(invalid(format!(
                "page file template '{template}' must not contain path separators"
            )));
        }

        let mut segments = Vec::new();
        let mut rest = template;
        while !rest.is_empty() {
            match rest.find(['{', '}']) {
                None => {
                    segments.push(Segment::Literal(rest.to_string()));
                    break;
                }
                Some(at) if rest[at..].starts_with('}') => {
                    return Err(invalid(format!("unmatched '}}' in template '{template}'")));
                }
                Some(at) => {
                    if at > 0 {
                        segments.push(Segment::Literal(rest[..at].to_string()));
                    }
                    let close = rest[at..].find('}').ok_or_else(|| {
                        invalid(format!("unterminated placeholder in template '{template}'"))
                    })?;
                    let name = &rest[at + 1..at + close];
                    segments.push(match name {
                        "cluster" => Segment::Cluster,
                        "column" => Segment::Column,
                        "page" => Segment::Page,
                        other => {
                            return Err(invalid(format!("unknown placeholder '{{{other}}}'")));
                        }
                    });
                    rest = &rest[at + close + 1..];
                }
            }
        }
        Ok(Self { segments })
    }

    pub fn render(&self, cluster_id: DescriptorId, column: &str, page: usize) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Cluster => out.push_str(&cluster_id.to_string()),
                Segment::Column => out.push_str(column),
                Segment::Page => out.push_str(&page.to_string()),
            }
        }
        out
    }

    /// Renders a page file name that stays inside the output directory.
    pub fn file_name(
        &self,
        cluster_id: DescriptorId,
        column: &str,
        page: usize,
    ) -> Result<String, Error> {
        let name = self.render(cluster_id, column, page);
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!(
                    "page file name '{name}' for column '{column}' is not a plain file name"
                ))
                .with_hint("Use a template that does not expand to a path, or dump another field."));
        }
        Ok(name)
    }
}

impl Default for PageFileTemplate {
    fn default() -> Self {
        Self {
            segments: vec![
                Segment::Literal("cluster".to_string()),
                Segment::Cluster,
                Segment::Literal("_".to_string()),
                Segment::Column,
                Segment::Literal("_pg".to_string()),
                Segment::Page,
                Segment::Literal(".page".to_string()),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_PAGE_TEMPLATE, PageFileTemplate};
    use crate::core::error::ErrorKind;

    #[test]
    fn default_matches_the_documented_name() {
        let parsed = PageFileTemplate::parse(DEFAULT_PAGE_TEMPLATE).expect("parse");
        assert_eq!(parsed, PageFileTemplate::default());
        assert_eq!(parsed.render(3, "px-0", 12), "cluster3_px-0_pg12.page");
    }

    #[test]
    fn placeholders_may_repeat_or_be_omitted() {
        let t = PageFileTemplate::parse("{column}.{column}").expect("parse");
        assert_eq!(t.render(0, "x-1", 0), "x-1.x-1");
        let t = PageFileTemplate::parse("page").expect("parse");
        assert_eq!(t.render(0, "x-1", 9), "page");
    }

    #[test]
    fn bad_templates_are_invalid_arguments() {
        for bad in ["", "{entry}.page", "{page", "page}", "dir/{page}", "{}"] {
            let err = PageFileTemplate::parse(bad).expect_err(bad);
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{bad}");
        }
    }

    #[test]
    fn names_that_leave_the_directory_are_rejected() {
        let t = PageFileTemplate::parse("{column}").expect("parse");
        for column in ["../escaped-0", "a\\b-0", "..", ".", ""] {
            let err = t.file_name(0, column, 0).expect_err(column);
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{column}");
        }
        assert_eq!(t.file_name(0, "..x-0", 0).expect("dots inside a name"), "..x-0");
        let t = PageFileTemplate::default();
        assert_eq!(t.file_name(1, "px-0", 2).expect("name"), "cluster1_px-0_pg2.page");
    }
}
