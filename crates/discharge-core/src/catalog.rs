//! 诊断目录
//!
//! 影像类型到期望诊断集合的静态映射。启动时加载一次，之后只读。

use crate::{DischargeError, Result};
use std::collections::{BTreeSet, HashMap};

/// 诊断目录
#[derive(Debug, Clone, Default)]
pub struct DiagnosisCatalog {
    entries: HashMap<String, BTreeSet<String>>,
}

impl DiagnosisCatalog {
    /// 从配置映射构建目录
    ///
    /// 类型键统一转为小写；每个类型至少要有一个诊断标签。
    pub fn from_map<I, L>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, L)>,
        L: IntoIterator<Item = String>,
    {
        let mut catalog = HashMap::new();
        for (imaging_type, labels) in entries {
            let labels: BTreeSet<String> = labels
                .into_iter()
                .map(|label| label.trim().to_string())
                .filter(|label| !label.is_empty())
                .collect();
            if labels.is_empty() {
                return Err(DischargeError::Config(format!(
                    "imaging type {} lists no expected diagnoses",
                    imaging_type
                )));
            }
            catalog
                .entry(Self::normalize(&imaging_type))
                .or_insert_with(BTreeSet::new)
                .extend(labels);
        }

        if catalog.is_empty() {
            return Err(DischargeError::Config(
                "diagnosis catalog is empty".to_string(),
            ));
        }

        Ok(Self { entries: catalog })
    }

    /// 查询影像类型的期望诊断
    pub fn expected(&self, imaging_type: &str) -> Result<&BTreeSet<String>> {
        self.entries
            .get(&Self::normalize(imaging_type))
            .ok_or_else(|| DischargeError::UnknownImagingType(imaging_type.to_string()))
    }

    pub fn imaging_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// 所有类型诊断标签的并集
    pub fn all_labels(&self) -> BTreeSet<String> {
        self.entries.values().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn normalize(imaging_type: &str) -> String {
        imaging_type.trim().to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> DiagnosisCatalog {
        DiagnosisCatalog::from_map(vec![
            ("MRI".to_string(), vec!["fracture".to_string(), "tumor".to_string()]),
            ("xray".to_string(), vec!["fracture".to_string(), "pneumonia".to_string()]),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let catalog = catalog();
        let expected = catalog.expected("mri").unwrap();
        assert_eq!(expected.len(), 2);
        assert!(expected.contains("tumor"));
        assert_eq!(catalog.expected("XRAY").unwrap(), catalog.expected("xray").unwrap());
    }

    #[test]
    fn test_unknown_type() {
        let binding = catalog();
        let result = binding.expected("PET");
        assert!(matches!(result, Err(DischargeError::UnknownImagingType(t)) if t == "PET"));
    }

    #[test]
    fn test_all_labels_is_union() {
        let labels = catalog().all_labels();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        assert_eq!(labels, vec!["fracture", "pneumonia", "tumor"]);
    }

    #[test]
    fn test_rejects_empty_entries() {
        let result = DiagnosisCatalog::from_map(vec![("CT".to_string(), vec![" ".to_string()])]);
        assert!(matches!(result, Err(DischargeError::Config(_))));

        let empty: Vec<(String, Vec<String>)> = Vec::new();
        assert!(DiagnosisCatalog::from_map(empty).is_err());
    }
}
