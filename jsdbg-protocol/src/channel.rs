//! トランスポートとのインターフェース
//!
//! コアエンジンはトランスポートのバイト単位の入出力を知りません。長さで区切られた
//! フレームを受け渡しできることだけを要求します。

use crate::ByteOrder;
use std::io;

/// 受信結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// 1フレーム分のペイロード（先頭はメッセージ型）
    Message(Vec<u8>),
    /// ノンブロッキング読み取りで、まだ何も届いていない
    Empty,
    /// 接続が閉じられた
    Eof,
}

/// フレーム単位の双方向チャネル
pub trait Channel {
    /// トランスポート固有の接続処理を行い、`config_size` バイトの設定レコードを返す
    fn connect(&mut self, config_size: usize) -> io::Result<Vec<u8>>;

    /// 1フレームを送信する
    fn send_message(&mut self, byte_order: ByteOrder, payload: &[u8]) -> io::Result<()>;

    /// 次のフレームを受信する
    ///
    /// `blocking` がfalseで何も届いていなければ [`Incoming::Empty`] を返します。
    fn get_message(&mut self, blocking: bool) -> io::Result<Incoming>;

    /// 接続を閉じる
    fn close(&mut self) -> io::Result<()>;
}
