// Pre-order enumeration of (column, field) pairs below a named field.
use crate::core::column_type::ColumnType;
use crate::core::descriptor::{Descriptor, DescriptorId, FIELD_ZERO_ID};
use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnInfo {
    pub column_id: DescriptorId,
    pub column_index: u32,
    pub column_type: ColumnType,
    pub field_id: DescriptorId,
    pub field_name: String,
    /// Dotted path from the top-level field, e.g. `jets._0`.
    pub field_path: String,
    /// `<field_name>-<column_index>`, used in page file names.
    pub qual_name: String,
}

/// Columns of the field named `root` and all its descendants.
///
/// An empty `root` starts at field zero; dotted paths reach nested fields. A field's own
/// columns come before its children's, children in declaration order.
pub fn collect_columns(descriptor: &Descriptor, root: &str) -> Result<Vec<ColumnInfo>, Error> {
    let root_id = if root.is_empty() {
        FIELD_ZERO_ID
    } else {
        descriptor.find_field_id_by_path(root).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!("field '{root}' does not exist"))
                .with_hint("Use a top-level field name or a dotted path such as 'jets.pt'.")
        })?
    };

    let mut out = Vec::new();
    for field in descriptor.subtree_fields(root_id) {
        let field_path = field_path(descriptor, field.id);
        for column in descriptor.field_columns(field.id) {
            out.push(ColumnInfo {
                column_id: column.physical_id,
                column_index: column.index,
                column_type: column.column_type,
                field_id: field.id,
                field_name: field.name.clone(),
                field_path: field_path.clone(),
                qual_name: format!("{}-{}", field.name, column.index),
            });
        }
    }
    Ok(out)
}

fn field_path(descriptor: &Descriptor, field_id: DescriptorId) -> String {
    let mut names = Vec::new();
    let mut current = descriptor.field(field_id);
    while let Some(field) = current {
        if field.id == FIELD_ZERO_ID {
            break;
        }
        names.push(field.name.as_str());
        current = field.parent_id.and_then(|parent| descriptor.field(parent));
    }
    names.reverse();
    names.join(".")
}

#[cfg(test)]
mod tests {
    use super::collect_columns;
    use crate::core::column_type::ColumnType;
    use crate::core::descriptor::{Descriptor, DescriptorBuilder, FIELD_ZERO_ID, NewField};
    use crate::core::error::ErrorKind;

    // jets (offsets) -> _0 (record) -> pt, eta ; then met.
    // Columns are created out of schema order to show the walk follows the tree.
    fn schema() -> Descriptor {
        let mut b = DescriptorBuilder::new("events");
        let jets = b.add_field(NewField::new(FIELD_ZERO_ID, "jets", "std::vector<Jet>")).unwrap();
        let jet = b.add_field(NewField::new(jets, "_0", "Jet")).unwrap();
        let pt = b.add_field(NewField::new(jet, "pt", "float")).unwrap();
        let eta = b.add_field(NewField::new(jet, "eta", "float")).unwrap();
        let met = b.add_field(NewField::new(FIELD_ZERO_ID, "met", "double")).unwrap();
        b.add_column(met, ColumnType::SplitReal64).unwrap();
        b.add_column(eta, ColumnType::SplitReal32).unwrap();
        b.add_column(pt, ColumnType::SplitReal32).unwrap();
        b.add_column(jets, ColumnType::SplitIndex64).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn whole_schema_in_pre_order() {
        let desc = schema();
        let cols = collect_columns(&desc, "").expect("collect");
        let ids: Vec<_> = cols.iter().map(|c| c.column_id).collect();
        assert_eq!(ids, vec![3, 2, 1, 0]);
        let names: Vec<_> = cols.iter().map(|c| c.qual_name.as_str()).collect();
        assert_eq!(names, vec!["jets-0", "pt-0", "eta-0", "met-0"]);
        assert_eq!(cols[1].field_path, "jets._0.pt");
    }

    #[test]
    fn named_subtree_keeps_the_same_order() {
        let desc = schema();
        let all = collect_columns(&desc, "").expect("all");
        let jets = collect_columns(&desc, "jets").expect("jets");
        assert_eq!(jets, all[..3].to_vec());
        let pt = collect_columns(&desc, "jets._0.pt").expect("pt");
        assert_eq!(pt.len(), 1);
        assert_eq!(pt[0].column_type, ColumnType::SplitReal32);
    }

    #[test]
    fn field_with_several_columns_lists_them_by_index() {
        let mut b = DescriptorBuilder::new("events");
        let s = b.add_field(NewField::new(FIELD_ZERO_ID, "label", "std::string")).unwrap();
        b.add_column(s, ColumnType::Index32).unwrap();
        b.add_column(s, ColumnType::Char).unwrap();
        let desc = b.build().unwrap();
        let cols = collect_columns(&desc, "label").expect("label");
        let names: Vec<_> = cols.iter().map(|c| c.qual_name.as_str()).collect();
        assert_eq!(names, vec!["label-0", "label-1"]);
    }

    #[test]
    fn unknown_field_is_not_found() {
        let desc = schema();
        let err = collect_columns(&desc, "muons").expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = collect_columns(&desc, "pt").expect_err("nested name needs a path");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
