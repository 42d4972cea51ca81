#[macro_export]
macro_rules! declare_resource_vector {
    ($struct_name:ident) => {
        #[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
        /// Units per resource, keyed by ResourceId.
        pub struct $struct_name {
            units: std::collections::BTreeMap<$crate::resource::ResourceId, $crate::resource::Units>,
        }

        impl $struct_name {
            pub fn new() -> Self {
                Self {
                    units: std::collections::BTreeMap::new(),
                }
            }

            /// One zero entry for every key.
            pub fn zeroed<'a, I>(keys: I) -> Self
            where
                I: IntoIterator<Item = &'a $crate::resource::ResourceId>,
            {
                Self {
                    units: keys.into_iter().map(|rid| (rid.clone(), 0)).collect(),
                }
            }

            pub fn from_pairs<K, I>(pairs: I) -> Self
            where
                K: Into<$crate::resource::ResourceId>,
                I: IntoIterator<Item = (K, $crate::resource::Units)>,
            {
                Self {
                    units: pairs.into_iter().map(|(rid, units)| (rid.into(), units)).collect(),
                }
            }

            /// Missing keys read as zero.
            pub fn get(&self, rid: &str) -> $crate::resource::Units {
                self.units.get(rid).copied().unwrap_or(0)
            }

            pub fn contains(&self, rid: &str) -> bool {
                self.units.contains_key(rid)
            }

            pub fn iter(
                &self,
            ) -> impl Iterator<Item = (&$crate::resource::ResourceId, $crate::resource::Units)> + '_
            {
                self.units.iter().map(|(rid, units)| (rid, *units))
            }

            pub fn keys(&self) -> impl Iterator<Item = &$crate::resource::ResourceId> + '_ {
                self.units.keys()
            }

            pub fn len(&self) -> usize {
                self.units.len()
            }

            pub fn is_empty(&self) -> bool {
                self.units.is_empty()
            }

            pub fn is_zero(&self) -> bool {
                self.units.values().all(|units| *units == 0)
            }

            pub fn total(&self) -> u64 {
                self.units.values().map(|units| u64::from(*units)).sum()
            }

            #[allow(dead_code)]
            pub(crate) fn set(
                &mut self,
                rid: &$crate::resource::ResourceId,
                units: $crate::resource::Units,
            ) {
                self.units.insert(rid.clone(), units);
            }
        }

        impl<K: Into<$crate::resource::ResourceId>> FromIterator<(K, $crate::resource::Units)>
            for $struct_name
        {
            fn from_iter<I: IntoIterator<Item = (K, $crate::resource::Units)>>(iter: I) -> Self {
                Self::from_pairs(iter)
            }
        }

        impl std::fmt::Display for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let entries = self
                    .units
                    .iter()
                    .map(|(rid, units)| format!("{}: {}", rid, units))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{}}}", entries)
            }
        }
    };
}
