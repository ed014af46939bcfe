//! 重複を持たないマルチマップ

use std::collections::BTreeMap;

/// キーごとに値の集合を持つマップ
///
/// 同じ (キー, 値) の組は一度しか格納されません。値の集合が空になったキーは削除されます。
#[derive(Debug, Clone)]
pub struct Multimap<K, V> {
    map: BTreeMap<K, Vec<V>>,
}

impl<K: Ord, V: PartialEq> Multimap<K, V> {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// 値を追加する。既に存在する場合はfalseを返す
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let values = self.map.entry(key).or_default();
        if values.contains(&value) {
            return false;
        }
        values.push(value);
        true
    }

    /// 値を1つ削除する。存在しなかった場合はfalseを返す
    pub fn remove_one(&mut self, key: &K, value: &V) -> bool {
        let Some(values) = self.map.get_mut(key) else {
            return false;
        };
        let Some(pos) = values.iter().position(|v| v == value) else {
            return false;
        };
        values.remove(pos);
        if values.is_empty() {
            self.map.remove(key);
        }
        true
    }

    /// キーに対応する値
    pub fn get(&self, key: &K) -> &[V] {
        self.map.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.get(key).contains(value)
    }

    /// 格納されている値の総数
    pub fn len(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K: Ord, V: PartialEq> Default for Multimap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
