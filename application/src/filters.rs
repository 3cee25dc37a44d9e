use domain::{Criterion, Logic, Operator, SearchQuery};

/// Query-string keys that configure the search instead of naming a field.
pub const LOGIC_PARAM: &str = "logic";
pub const OPERATOR_PARAM: &str = "operator";

/// Builds a search from flat query parameters such as
/// `?name=rex&age=5&operator=EQUAL&logic=OR`.
///
/// `logic` (default AND) and `operator` (default CONTAINS) apply to the whole
/// query; every other pair becomes one criterion. Parameters that only carry
/// `logic`/`operator` produce an empty query, which matches nothing.
pub fn query_from_params<I, K, V>(params: I) -> SearchQuery
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let params: Vec<(K, V)> = params.into_iter().collect();
    let lookup = |name: &str| {
        params
            .iter()
            .find(|(key, _)| key.as_ref() == name)
            .map(|(_, value)| value.as_ref())
    };
    let logic = lookup(LOGIC_PARAM).map(Logic::parse).unwrap_or_default();
    let operator = lookup(OPERATOR_PARAM).map(Operator::parse).unwrap_or_default();

    let criteria = params
        .iter()
        .filter(|(key, _)| !matches!(key.as_ref(), LOGIC_PARAM | OPERATOR_PARAM))
        .map(|(key, value)| Criterion::new(key.as_ref(), operator.clone(), value.as_ref()))
        .collect();

    SearchQuery { logic, criteria }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_params_become_contains_criteria() {
        let query = query_from_params([("name", "rex"), ("specie", "dog")]);
        assert_eq!(query.logic, Logic::And);
        assert_eq!(
            query.criteria,
            vec![
                Criterion::new("name", Operator::Contains, "rex"),
                Criterion::new("specie", Operator::Contains, "dog"),
            ]
        );
    }

    #[test]
    fn logic_and_operator_apply_to_every_criterion() {
        let query = query_from_params([
            ("age", "3"),
            ("logic", "or"),
            ("operator", "MORE_THAN"),
            ("owner_id", "1"),
        ]);
        assert_eq!(query.logic, Logic::Or);
        assert_eq!(query.criteria.len(), 2);
        assert!(query.criteria.iter().all(|c| c.operator == Operator::MoreThan));
    }

    #[test]
    fn control_params_alone_yield_empty_query() {
        let query = query_from_params([("logic", "OR")]);
        assert!(query.criteria.is_empty());
    }
}
