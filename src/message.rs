use serde::Serialize;
use simd_json::owned::{Object, Value};

/// 出站消息段
#[derive(Debug, Serialize, Clone)]
pub struct OutSegment {
    #[serde(rename = "type")]
    pub type_: String,
    pub data: Object,
}

impl OutSegment {
    pub fn new(type_: &str, data: Object) -> Self {
        Self {
            type_: type_.to_string(),
            data,
        }
    }

    fn into_value(self) -> Value {
        let mut seg_obj = Object::new();
        seg_obj.insert("type".into(), Value::from(self.type_));
        seg_obj.insert("data".into(), Value::from(self.data));
        Value::from(seg_obj)
    }
}

/// 消息链 (Message Chain)
#[derive(Debug, Serialize, Clone, Default)]
pub struct Message(Vec<OutSegment>);

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, type_: &str, data: Object) -> Self {
        self.0.push(OutSegment::new(type_, data));
        self
    }

    pub fn segments(&self) -> &[OutSegment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 纯文本
    pub fn text(self, text: impl Into<String>) -> Self {
        let mut data = Object::new();
        data.insert("text".into(), Value::from(text.into()));
        self.add("text", data)
    }

    /// 图片
    /// - `file`: URL、`base64://` 或 `file://` 路径
    pub fn image(self, file: impl Into<String>) -> Self {
        let mut data = Object::new();
        data.insert("file".into(), Value::from(file.into()));
        self.add("image", data)
    }

    /// 视频
    pub fn video(self, file: impl Into<String>) -> Self {
        let mut data = Object::new();
        data.insert("file".into(), Value::from(file.into()));
        self.add("video", data)
    }

    /// @某人
    pub fn at(self, user_id: impl ToString) -> Self {
        let mut data = Object::new();
        data.insert("qq".into(), Value::from(user_id.to_string()));
        self.add("at", data)
    }

    /// 回复消息
    pub fn reply(self, message_id: impl ToString) -> Self {
        let mut data = Object::new();
        data.insert("id".into(), Value::from(message_id.to_string()));
        self.add("reply", data)
    }

    /// 转发消息节点 - 自定义内容
    pub fn node_custom(
        self,
        user_id: impl ToString,
        nickname: impl Into<String>,
        content: Message,
    ) -> Self {
        let mut data = Object::new();
        data.insert("user_id".into(), Value::from(user_id.to_string()));
        data.insert("nickname".into(), Value::from(nickname.into()));

        let content_array: Vec<Value> = content.0.into_iter().map(OutSegment::into_value).collect();
        data.insert("content".into(), Value::from(content_array));

        self.add("node", data)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::new().text(s)
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::new().text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_onebot_segments() {
        let msg = Message::new().at(10001).text(" 你好").image("file:///tmp/a.png");
        let json = simd_json::to_string(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value[0]["type"], "at");
        assert_eq!(value[0]["data"]["qq"], "10001");
        assert_eq!(value[1]["data"]["text"], " 你好");
        assert_eq!(value[2]["data"]["file"], "file:///tmp/a.png");
    }

    #[test]
    fn custom_node_embeds_content() {
        let inner = Message::new().text("作者昵称：某人");
        let msg = Message::new().node_custom(42, "星辰旅人", inner);
        let json = simd_json::to_string(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value[0]["type"], "node");
        assert_eq!(value[0]["data"]["nickname"], "星辰旅人");
        assert_eq!(value[0]["data"]["content"][0]["data"]["text"], "作者昵称：某人");
    }
}
